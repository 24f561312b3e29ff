//! Dictionary model (§3, §4.8): an in-memory, read-only description of a
//! device's register map, loaded once from an XML file and immutable after
//! that.

mod model;
mod xml;

pub use model::{Access, Dictionary, Dtype, Labels, Phy, Range, Register};
pub use xml::{load_reader, load_str};

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::Error;

impl Dictionary {
    /// Loads a dictionary from an XML file on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Dictionary, Error> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::Parse(format!("open {}: {e}", path.display())))?;
        xml::load_reader(BufReader::new(file)).map_err(Error::record)
    }
}
