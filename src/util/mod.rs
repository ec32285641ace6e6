pub use nalgebra::{Vector2, Vector3};

/// Per-point field state.
/// The core never looks inside it, it only copies it around,
/// hands it to the update rule and puts it on the wire as raw bytes.
pub trait FieldState: bytemuck::Pod + Send + Sync + 'static {}

impl<T: bytemuck::Pod + Send + Sync + 'static> FieldState for T {}

/// Size of one state on the wire.
#[inline]
pub fn state_size<S: FieldState>() -> usize {
    std::mem::size_of::<S>()
}
