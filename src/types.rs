pub mod push;
pub mod worker;
