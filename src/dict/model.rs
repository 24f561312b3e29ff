//! In-memory dictionary model (§3, §4.8): categories, subcategories,
//! registers, and their localized labels.

use std::collections::HashMap;
use std::ops::RangeInclusive;

use crate::error::Error;

/// A register's wire data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    U8,
    S8,
    U16,
    S16,
    U32,
    S32,
    U64,
    S64,
}

/// A register's access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Ro,
    Wo,
    Rw,
}

/// Physical unit a register's value is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phy {
    #[default]
    None,
    Torque,
    Pos,
    Vel,
    Acc,
    VoltRel,
    Rad,
}

/// A register's valid value range, stored in its declared [`Dtype`]'s native
/// width as a signed 128-bit pair so every dtype fits without truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub min: i128,
    pub max: i128,
}

impl Range {
    /// The full domain of `dtype`, used when a register's XML entry omits
    /// an explicit range (§4.8).
    pub fn full_domain(dtype: Dtype) -> Self {
        match dtype {
            Dtype::U8 => Range { min: u8::MIN as i128, max: u8::MAX as i128 },
            Dtype::S8 => Range { min: i8::MIN as i128, max: i8::MAX as i128 },
            Dtype::U16 => Range { min: u16::MIN as i128, max: u16::MAX as i128 },
            Dtype::S16 => Range { min: i16::MIN as i128, max: i16::MAX as i128 },
            Dtype::U32 => Range { min: u32::MIN as i128, max: u32::MAX as i128 },
            Dtype::S32 => Range { min: i32::MIN as i128, max: i32::MAX as i128 },
            Dtype::U64 => Range { min: u64::MIN as i128, max: u64::MAX as i128 },
            Dtype::S64 => Range { min: i64::MIN as i128, max: i64::MAX as i128 },
        }
    }

    pub fn as_inclusive(&self) -> RangeInclusive<i128> {
        self.min..=self.max
    }
}

/// A mapping from language tag (e.g. `"en_US"`) to human-readable string,
/// iterating in stable insertion order.
#[derive(Debug, Clone, Default)]
pub struct Labels {
    order: Vec<String>,
    by_lang: HashMap<String, String>,
}

impl Labels {
    pub fn new() -> Self {
        Labels::default()
    }

    pub fn insert(&mut self, lang: impl Into<String>, text: impl Into<String>) {
        let lang = lang.into();
        if !self.by_lang.contains_key(&lang) {
            self.order.push(lang.clone());
        }
        self.by_lang.insert(lang, text.into());
    }

    pub fn get(&self, lang: &str) -> Result<&str, Error> {
        self.by_lang
            .get(lang)
            .map(String::as_str)
            .ok_or_else(|| Error::UnknownLang(lang.to_string()))
    }

    /// Language tags in stable insertion order.
    pub fn langs(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn count(&self) -> usize {
        self.order.len()
    }
}

/// A single addressable register, described by the dictionary.
#[derive(Debug, Clone)]
pub struct Register {
    pub id: String,
    pub address: u32,
    pub dtype: Dtype,
    pub access: Access,
    pub phy: Phy,
    pub range: Range,
    pub labels: Labels,
    pub cat_id: String,
    pub scat_id: String,
}

/// The immutable, read-only register/category/label store for one device.
///
/// Registers reference their containing category/subcategory by string id
/// rather than by pointer, avoiding ownership cycles (§9).
#[derive(Debug, Default)]
pub struct Dictionary {
    cat_order: Vec<String>,
    cats: HashMap<String, Labels>,
    scat_order: HashMap<String, Vec<String>>,
    scats: HashMap<String, HashMap<String, Labels>>,
    reg_order: Vec<String>,
    regs: HashMap<String, Register>,
}

impl Dictionary {
    pub fn cat_ids(&self) -> &[String] {
        &self.cat_order
    }

    pub fn cat(&self, id: &str) -> Result<&Labels, Error> {
        self.cats.get(id).ok_or_else(|| Error::Invalid(format!("unknown category id: {id}")))
    }

    pub fn scat_ids(&self, cat_id: &str) -> Result<Vec<&str>, Error> {
        if !self.scats.contains_key(cat_id) {
            return Err(Error::Invalid(format!("unknown category id: {cat_id}")));
        }
        Ok(self
            .scat_order
            .get(cat_id)
            .map(|order| order.iter().map(String::as_str).collect())
            .unwrap_or_default())
    }

    pub fn scat(&self, cat_id: &str, scat_id: &str) -> Result<&Labels, Error> {
        self.scats
            .get(cat_id)
            .and_then(|m| m.get(scat_id))
            .ok_or_else(|| Error::Invalid(format!("unknown subcategory: {cat_id}/{scat_id}")))
    }

    pub fn reg_ids(&self) -> &[String] {
        &self.reg_order
    }

    pub fn reg(&self, id: &str) -> Result<&Register, Error> {
        self.regs.get(id).ok_or_else(|| Error::Invalid(format!("unknown register id: {id}")))
    }
}

/// Builder used by [`crate::dict::xml`] while consuming the parse event
/// stream. Not exposed outside the crate: callers only ever see the
/// finished, immutable [`Dictionary`].
#[derive(Default)]
pub(crate) struct DictionaryBuilder {
    dict: Dictionary,
}

impl DictionaryBuilder {
    pub(crate) fn new() -> Self {
        DictionaryBuilder::default()
    }

    pub(crate) fn add_category(&mut self, id: String, labels: Labels) {
        if !self.dict.cats.contains_key(&id) {
            self.dict.cat_order.push(id.clone());
        }
        self.dict.cats.insert(id, labels);
    }

    pub(crate) fn add_subcategory(&mut self, cat_id: String, scat_id: String, labels: Labels) {
        let already_known =
            self.dict.scats.get(&cat_id).is_some_and(|m| m.contains_key(&scat_id));
        if !already_known {
            self.dict.scat_order.entry(cat_id.clone()).or_default().push(scat_id.clone());
        }
        self.dict.scats.entry(cat_id).or_default().insert(scat_id, labels);
    }

    pub(crate) fn add_register(&mut self, reg: Register) -> Result<(), Error> {
        if reg.range.min > reg.range.max {
            return Err(Error::Parse(format!(
                "register {} has min > max in its declared dtype",
                reg.id
            )));
        }
        if !reg.cat_id.is_empty() && !self.dict.cats.contains_key(&reg.cat_id) {
            return Err(Error::Parse(format!(
                "register {} refers to unknown category {}",
                reg.id, reg.cat_id
            )));
        }
        if !reg.scat_id.is_empty() {
            let known = self
                .dict
                .scats
                .get(&reg.cat_id)
                .is_some_and(|m| m.contains_key(&reg.scat_id));
            if !known {
                return Err(Error::Parse(format!(
                    "register {} refers to unknown subcategory {}/{}",
                    reg.id, reg.cat_id, reg.scat_id
                )));
            }
        }

        if !self.dict.regs.contains_key(&reg.id) {
            self.dict.reg_order.push(reg.id.clone());
        }
        self.dict.regs.insert(reg.id.clone(), reg);
        Ok(())
    }

    pub(crate) fn finish(self) -> Dictionary {
        self.dict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_preserve_insertion_order() {
        let mut labels = Labels::new();
        labels.insert("en_US", "Speed");
        labels.insert("fr_FR", "Vitesse");
        let langs: Vec<&str> = labels.langs().collect();
        assert_eq!(langs, vec!["en_US", "fr_FR"]);
        assert_eq!(labels.get("en_US").unwrap(), "Speed");
        assert!(matches!(labels.get("de_DE"), Err(Error::UnknownLang(_))));
    }

    #[test]
    fn scat_ids_preserve_insertion_order() {
        let mut builder = DictionaryBuilder::new();
        builder.add_category("c1".into(), Labels::new());
        builder.add_subcategory("c1".into(), "z_last".into(), Labels::new());
        builder.add_subcategory("c1".into(), "a_first".into(), Labels::new());
        let dict = builder.finish();
        assert_eq!(dict.scat_ids("c1").unwrap(), vec!["z_last", "a_first"]);
    }

    #[test]
    fn full_domain_round_trips_dtype_bounds() {
        let r = Range::full_domain(Dtype::S16);
        assert_eq!(r.min, i16::MIN as i128);
        assert_eq!(r.max, i16::MAX as i128);
        assert!(r.min <= r.max);
    }

    #[test]
    fn builder_rejects_register_with_unknown_category() {
        let mut builder = DictionaryBuilder::new();
        let reg = Register {
            id: "r1".into(),
            address: 0x20,
            dtype: Dtype::U16,
            access: Access::Rw,
            phy: Phy::None,
            range: Range { min: 0, max: 1000 },
            labels: Labels::new(),
            cat_id: "missing".into(),
            scat_id: String::new(),
        };
        assert!(builder.add_register(reg).is_err());
    }

    #[test]
    fn builder_rejects_inverted_range() {
        let mut builder = DictionaryBuilder::new();
        let reg = Register {
            id: "r1".into(),
            address: 0x20,
            dtype: Dtype::U16,
            access: Access::Rw,
            phy: Phy::None,
            range: Range { min: 1000, max: 0 },
            labels: Labels::new(),
            cat_id: String::new(),
            scat_id: String::new(),
        };
        assert!(builder.add_register(reg).is_err());
    }
}
