pub mod due;
pub mod init;
pub mod review;
pub mod validate;
