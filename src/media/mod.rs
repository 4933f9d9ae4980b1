pub mod scanner;
pub mod stream;
pub mod thumbnail;
