pub mod lexer;
mod reader;

pub use reader::read;
pub use reader::read_datum;
pub use reader::read_many;
pub use reader::Datum;
pub use reader::Input;
