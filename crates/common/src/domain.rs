mod reading;
mod result;
mod uplink;

pub use reading::*;
pub use result::*;
pub use uplink::*;
