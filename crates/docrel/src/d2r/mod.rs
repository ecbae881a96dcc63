//! Document ⇄ row translation.
//!
//! [`D2RTranslator`] decomposes documents into per-doc-part rows, registering
//! the metadata they need; [`R2DTranslator`] rebuilds documents from the rows
//! the read interface fetched.

mod assemble;
mod data;
mod decompose;

pub use assemble::R2DTranslator;
pub use data::{CollectionData, DocPartData, DocPartRow};
pub use decompose::D2RTranslator;
