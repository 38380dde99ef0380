//! # odt-image-replacer: Tagged Image Replacement for OpenDocument Files
//!
//! `odt-image-replacer` swaps the pictures inside an OpenDocument file (a ZIP
//! container of XML parts) by the name given to their frame, without touching
//! anything else in the container.
//!
//! ## Features
//!
//! - **Bounded ingestion**: archive size, entry count and per-entry size are capped,
//!   declared and actual sizes are both checked (zip-bomb safe)
//! - **Lazy overlay**: only the parts you edit are held in memory; untouched
//!   entries are copied from the source when saving
//! - **Tag based**: images are addressed by the frame's `draw:name`, not by file path
//! - **Manifest sync**: `META-INF/manifest.xml` gains a record for every new image
//! - **Lossless save**: original entry order is kept, `mimetype` stays first and stored
//!
//! ## Quick Start
//!
//! ### Replacing an image
//!
//! ```no_run
//! use odt_image_replacer::Document;
//!
//! let mut doc = Document::open("template.odt")?;
//!
//! for tag in doc.find_image_tags()? {
//!     println!("frame: {}", tag);
//! }
//!
//! let logo = std::fs::read("logo.png")?;
//! doc.replace_image_by_tag("image1", "Pictures/logo.png", logo)?;
//! doc.save("output.odt")?;
//! # Ok::<(), odt_image_replacer::OdtError>(())
//! ```
//!
//! ### Working in memory
//!
//! ```no_run
//! use odt_image_replacer::Document;
//!
//! # fn fetch_template() -> Vec<u8> { Vec::new() }
//! let mut doc = Document::from_bytes(fetch_template())?;
//!
//! let report = doc.replace_images([
//!     ("image1", std::fs::read("a.png")?),
//!     ("photo1", std::fs::read("b.jpg")?),
//! ]);
//! println!("replaced: {:?}", report.replaced);
//!
//! let odt_bytes = doc.save_to_bytes()?;
//! # Ok::<(), odt_image_replacer::OdtError>(())
//! ```

pub mod content;
pub mod document;
pub mod error;
pub mod limits;
pub mod manifest;
pub mod media;
pub mod reader;
pub mod serialize;
pub mod store;
pub mod validate;
pub mod writer;

pub use document::{Document, ReplaceReport, PICTURES_DIR};
pub use error::{OdtError, Result};
pub use limits::Limits;
pub use reader::{ArchiveEntry, ArchiveReader};
pub use serialize::SaveStats;
pub use validate::{validate_image_name, validate_path};
pub use writer::{CompressionMethod, StreamingZipWriter};
