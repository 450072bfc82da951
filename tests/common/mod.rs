pub mod fakes;
pub mod helpers;
