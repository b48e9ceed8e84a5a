mod playlist;
mod reload;
mod utils;
mod variant;

pub use playlist::*;
pub use reload::ReloadState;
pub use utils::*;
pub use variant::*;
