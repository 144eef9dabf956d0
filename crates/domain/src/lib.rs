extern crate self as quoteforge_domain;

pub mod common;
pub mod entities;
pub mod error;
pub mod events;
pub mod ids;
pub mod value_objects;

// Re-export all entities (explicit list in entities/mod.rs)
pub use entities::{
    Attachment, CadVersion, Note, Order, OrderLineItem, OrderStatus, Part, Quote, QuoteLineItem,
    QuotePart, QuoteStatus, RecordOwner,
};

pub use error::DomainError;
pub use events::DomainEvent;

// Re-export ID types
pub use ids::{
    AttachmentId, CadVersionId, CustomerId, NoteId, OrderId, OrderLineItemId, PartId, QuoteId,
    QuoteLineItemId, QuotePartId,
};

// Re-export value objects
pub use value_objects::{
    CadFormat, ConversionState, ConversionStatus, EntityKind, PartName, SkipReason,
};
