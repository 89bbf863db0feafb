pub mod bilinear;
pub mod block;
pub mod error;
pub mod init;
pub mod stbln;
pub mod temporal;

pub mod prelude {
    pub use crate::bilinear::*;
    pub use crate::block::*;
    pub use crate::error::*;
    pub use crate::init::InitWeights;
    pub use crate::stbln::*;
    pub use crate::temporal::*;
}
