pub mod entity;
pub mod events;
pub mod models;
pub mod polling;
pub mod setup;
pub mod traits;

pub use entity::*;
pub use events::*;
pub use models::*;
pub use polling::*;
pub use setup::*;
pub use traits::*;
