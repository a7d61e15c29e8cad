pub mod cancel;
pub mod consts;
pub mod error;
pub mod io;
pub mod mesh;
pub mod register;
pub mod resample;
pub mod search;
pub mod transform;
pub mod volume;
