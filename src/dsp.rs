pub mod autoset;
pub mod coupling;
pub mod measure;
pub mod normalizer;
pub mod ring_buffer;
pub mod spectrum;
pub mod trigger;

/// Vertical graticule divisions; the full display height spans 2.0 units.
pub const GRID_DIVISIONS_Y: f32 = 8.0;
/// Horizontal graticule divisions covered by one screen width.
pub const GRID_DIVISIONS_X: f32 = 10.0;
/// Display units covered by one vertical division.
pub const UNITS_PER_DIVISION: f32 = 2.0 / GRID_DIVISIONS_Y;

pub trait Reconfigurable<Cfg> {
    fn update_config(&mut self, config: Cfg);
}
