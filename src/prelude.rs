pub use crate::*;
pub use byteorder::{ByteOrder, LittleEndian};
pub use log::{debug, warn};
