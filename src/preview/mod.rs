// Video signal: frame storage, device pixel conversion and JPEG encoding.

pub mod capture;
pub mod compress;
pub mod convert;
