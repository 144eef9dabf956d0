//! Order use cases - quote conversion and order numbering.

pub mod convert_quote;
pub mod order_number;

pub use convert_quote::{ConvertQuoteError, ConvertQuoteToOrder, ConvertedQuote};
pub use order_number::OrderNumberGenerator;
