mod item;
mod item_store;
mod source;
mod status;
mod technology;

pub use item::{FormData, Item, ItemKind, RenderHandle};
pub use item_store::ItemStore;
pub use source::InterfaceSource;
pub use status::{InterfaceStatus, LogColor, LogLine};
pub use technology::Technology;
