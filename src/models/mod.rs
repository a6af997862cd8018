pub mod correction;
pub mod enums;
pub mod notification;
pub mod principal;
pub mod record;

pub use correction::*;
pub use enums::*;
pub use notification::*;
pub use principal::*;
pub use record::*;
