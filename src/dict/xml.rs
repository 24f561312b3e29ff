//! Dictionary XML load pipeline (§4.8, §6).
//!
//! Consumes `quick_xml`'s pull-parser event stream, which stands in for the
//! parser-agnostic `{start_element, end_element, text, attribute}` stream
//! described by the model this was ported from. Unknown elements are
//! ignored; malformed numeric attributes fail the load with
//! [`Error::Parse`].

use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::model::{Access, Dictionary, DictionaryBuilder, Dtype, Labels, Phy, Range, Register};
use crate::error::Error;

/// Parses a dictionary from an in-memory XML string.
pub fn load_str(xml: &str) -> Result<Dictionary, Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    load(&mut reader)
}

/// Parses a dictionary from any buffered XML source.
pub fn load_reader<R: BufRead>(source: R) -> Result<Dictionary, Error> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);
    load(&mut reader)
}

fn attr(tag: &BytesStart<'_>, name: &str) -> Result<Option<String>, Error> {
    for attribute in tag.attributes() {
        let attribute = attribute.map_err(|e| Error::Parse(format!("bad attribute: {e}")))?;
        if attribute.key.as_ref() == name.as_bytes() {
            let value = attribute
                .unescape_value()
                .map_err(|e| Error::Parse(format!("bad attribute value: {e}")))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn required_attr(tag: &BytesStart<'_>, name: &str) -> Result<String, Error> {
    attr(tag, name)?.ok_or_else(|| Error::Parse(format!("missing required attribute: {name}")))
}

fn parse_dtype(s: &str) -> Result<Dtype, Error> {
    match s {
        "U8" => Ok(Dtype::U8),
        "S8" => Ok(Dtype::S8),
        "U16" => Ok(Dtype::U16),
        "S16" => Ok(Dtype::S16),
        "U32" => Ok(Dtype::U32),
        "S32" => Ok(Dtype::S32),
        "U64" => Ok(Dtype::U64),
        "S64" => Ok(Dtype::S64),
        other => Err(Error::Parse(format!("unknown dtype: {other}"))),
    }
}

fn parse_access(s: &str) -> Result<Access, Error> {
    match s {
        "RO" => Ok(Access::Ro),
        "WO" => Ok(Access::Wo),
        "RW" => Ok(Access::Rw),
        other => Err(Error::Parse(format!("unknown access: {other}"))),
    }
}

fn parse_phy(s: &str) -> Result<Phy, Error> {
    match s {
        "NONE" => Ok(Phy::None),
        "TORQUE" => Ok(Phy::Torque),
        "POS" => Ok(Phy::Pos),
        "VEL" => Ok(Phy::Vel),
        "ACC" => Ok(Phy::Acc),
        "VOLT_REL" => Ok(Phy::VoltRel),
        "RAD" => Ok(Phy::Rad),
        other => Err(Error::Parse(format!("unknown phy: {other}"))),
    }
}

fn parse_hex_u32(s: &str) -> Result<u32, Error> {
    let s = s.trim().trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(s, 16).map_err(|e| Error::Parse(format!("bad hex address '{s}': {e}")))
}

fn parse_range_bound(s: &str) -> Result<i128, Error> {
    s.trim().parse::<i128>().map_err(|e| Error::Parse(format!("bad range bound '{s}': {e}")))
}

#[derive(Default)]
struct PendingRegister {
    id: String,
    address: Option<u32>,
    dtype: Option<Dtype>,
    access: Option<Access>,
    phy: Phy,
    range_min: Option<i128>,
    range_max: Option<i128>,
    cat_id: String,
    scat_id: String,
    labels: Labels,
}

enum Scope {
    Categories,
    Category { id: String, labels: Labels },
    Subcategories { cat_id: String },
    Subcategory { cat_id: String, scat_id: String, labels: Labels },
    Registers,
    Register(Box<PendingRegister>),
    Labels,
}

fn load<R: BufRead>(reader: &mut Reader<R>) -> Result<Dictionary, Error> {
    let mut builder = DictionaryBuilder::new();
    let mut stack: Vec<Scope> = Vec::new();
    let mut pending_lang: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(|e| Error::Parse(e.to_string()))? {
            Event::Eof => break,
            Event::Start(tag) => {
                let name = tag.local_name();
                let name = name.as_ref();
                match name {
                    b"Categories" => stack.push(Scope::Categories),
                    b"Category" => {
                        let id = required_attr(&tag, "id")?;
                        stack.push(Scope::Category { id, labels: Labels::new() });
                    }
                    b"Subcategories" => {
                        let cat_id = current_cat_id(&stack)?;
                        stack.push(Scope::Subcategories { cat_id });
                    }
                    b"Subcategory" => {
                        let scat_id = required_attr(&tag, "id")?;
                        let cat_id = current_cat_id(&stack)?;
                        stack.push(Scope::Subcategory { cat_id, scat_id, labels: Labels::new() });
                    }
                    b"Registers" => stack.push(Scope::Registers),
                    b"Register" => {
                        let mut pending = PendingRegister { id: required_attr(&tag, "id")?, ..Default::default() };
                        if let Some(addr) = attr(&tag, "address")? {
                            pending.address = Some(parse_hex_u32(&addr)?);
                        }
                        if let Some(dtype) = attr(&tag, "dtype")? {
                            pending.dtype = Some(parse_dtype(&dtype)?);
                        }
                        if let Some(access) = attr(&tag, "access")? {
                            pending.access = Some(parse_access(&access)?);
                        }
                        if let Some(phy) = attr(&tag, "phy")? {
                            pending.phy = parse_phy(&phy)?;
                        }
                        if let Some(min) = attr(&tag, "range-min")? {
                            pending.range_min = Some(parse_range_bound(&min)?);
                        }
                        if let Some(max) = attr(&tag, "range-max")? {
                            pending.range_max = Some(parse_range_bound(&max)?);
                        }
                        if let Some(cat_id) = attr(&tag, "cat_id")? {
                            pending.cat_id = cat_id;
                        }
                        if let Some(scat_id) = attr(&tag, "scat_id")? {
                            pending.scat_id = scat_id;
                        }
                        stack.push(Scope::Register(Box::new(pending)));
                    }
                    b"Labels" => stack.push(Scope::Labels),
                    b"Label" => {
                        pending_lang = attr(&tag, "lang")?;
                    }
                    // Unknown elements, including `Body`, are ignored per §6.
                    _ => {}
                }
            }
            Event::Empty(tag) => {
                // Self-closing elements with no nested content produce an
                // `Empty` event instead of a `Start`/`End` pair.
                let name = tag.local_name();
                if name.as_ref() == b"Category" {
                    let id = required_attr(&tag, "id")?;
                    builder.add_category(id, Labels::new());
                } else if name.as_ref() == b"Subcategory" {
                    let scat_id = required_attr(&tag, "id")?;
                    let cat_id = current_cat_id(&stack)?;
                    builder.add_subcategory(cat_id, scat_id, Labels::new());
                } else if name.as_ref() == b"Register" {
                    let id = required_attr(&tag, "id")?;
                    let address = parse_hex_u32(&required_attr(&tag, "address")?)?;
                    let dtype = parse_dtype(&required_attr(&tag, "dtype")?)?;
                    let access = parse_access(&required_attr(&tag, "access")?)?;
                    let phy = attr(&tag, "phy")?.map(|p| parse_phy(&p)).transpose()?.unwrap_or(Phy::None);
                    let range = match (attr(&tag, "range-min")?, attr(&tag, "range-max")?) {
                        (Some(min), Some(max)) => {
                            Range { min: parse_range_bound(&min)?, max: parse_range_bound(&max)? }
                        }
                        _ => Range::full_domain(dtype),
                    };
                    let cat_id = attr(&tag, "cat_id")?.unwrap_or_default();
                    let scat_id = attr(&tag, "scat_id")?.unwrap_or_default();
                    builder.add_register(Register {
                        id,
                        address,
                        dtype,
                        access,
                        phy,
                        range,
                        labels: Labels::new(),
                        cat_id,
                        scat_id,
                    })?;
                }
            }
            Event::Text(text) => {
                if let Some(lang) = pending_lang.take() {
                    let value = text
                        .unescape()
                        .map_err(|e| Error::Parse(format!("bad label text: {e}")))?
                        .into_owned();
                    match stack.last_mut() {
                        Some(Scope::Labels) => {
                            // Attach to the labels belonging to whatever
                            // Category/Subcategory/Register scope encloses
                            // this Labels block.
                            attach_label(&mut stack, lang, value)?;
                        }
                        _ => {}
                    }
                }
            }
            Event::End(tag) => {
                let name = tag.local_name();
                match name.as_ref() {
                    b"Category" => {
                        if let Some(Scope::Category { id, labels }) = stack.pop() {
                            builder.add_category(id, labels);
                        }
                    }
                    b"Subcategory" => {
                        if let Some(Scope::Subcategory { cat_id, scat_id, labels }) = stack.pop() {
                            builder.add_subcategory(cat_id, scat_id, labels);
                        }
                    }
                    b"Subcategories" | b"Categories" | b"Registers" => {
                        stack.pop();
                    }
                    b"Register" => {
                        if let Some(Scope::Register(pending)) = stack.pop() {
                            let address = pending
                                .address
                                .ok_or_else(|| Error::Parse(format!("register {} missing address", pending.id)))?;
                            let dtype = pending
                                .dtype
                                .ok_or_else(|| Error::Parse(format!("register {} missing dtype", pending.id)))?;
                            let access = pending
                                .access
                                .ok_or_else(|| Error::Parse(format!("register {} missing access", pending.id)))?;
                            let range = match (pending.range_min, pending.range_max) {
                                (Some(min), Some(max)) => Range { min, max },
                                _ => Range::full_domain(dtype),
                            };
                            builder.add_register(Register {
                                id: pending.id,
                                address,
                                dtype,
                                access,
                                phy: pending.phy,
                                range,
                                labels: pending.labels,
                                cat_id: pending.cat_id,
                                scat_id: pending.scat_id,
                            })?;
                        }
                    }
                    b"Labels" => {
                        stack.pop();
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(builder.finish())
}

fn current_cat_id(stack: &[Scope]) -> Result<String, Error> {
    for scope in stack.iter().rev() {
        if let Scope::Category { id, .. } = scope {
            return Ok(id.clone());
        }
    }
    Err(Error::Parse("Subcategory/Subcategories outside of a Category".into()))
}

/// Attaches a decoded `<Label>` to whichever Register/Subcategory/Category
/// scope most closely encloses the `<Labels>` block it was found in.
fn attach_label(stack: &mut [Scope], lang: String, value: String) -> Result<(), Error> {
    for scope in stack.iter_mut().rev() {
        match scope {
            Scope::Register(pending) => {
                pending.labels.insert(lang, value);
                return Ok(());
            }
            Scope::Subcategory { labels, .. } => {
                labels.insert(lang, value);
                return Ok(());
            }
            Scope::Category { labels, .. } => {
                labels.insert(lang, value);
                return Ok(());
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const S6_XML: &str = r#"
        <Body>
            <Categories>
                <Category id="c1">
                    <Subcategories>
                        <Subcategory id="s1"/>
                    </Subcategories>
                </Category>
            </Categories>
            <Registers>
                <Register id="r1" address="0x0020" dtype="U16" access="RW" cat_id="c1" scat_id="s1">
                    <Labels>
                        <Label lang="en_US">Speed</Label>
                    </Labels>
                </Register>
            </Registers>
        </Body>
    "#;

    #[test]
    fn s6_scenario_loads_category_subcategory_and_register() {
        let dict = load_str(S6_XML).unwrap();

        assert_eq!(dict.cat_ids(), &["c1".to_string()]);
        assert_eq!(dict.scat_ids("c1").unwrap(), vec!["s1"]);

        let reg = dict.reg("r1").unwrap();
        assert_eq!(reg.address, 0x0020);
        assert_eq!(reg.range.min, 0);
        assert_eq!(reg.range.max, u16::MAX as i128);
        assert_eq!(reg.labels.get("en_US").unwrap(), "Speed");
        assert!(matches!(reg.labels.get("fr_FR"), Err(Error::UnknownLang(_))));
    }

    #[test]
    fn explicit_range_overrides_dtype_default() {
        let xml = r#"
            <Body>
                <Registers>
                    <Register id="r1" address="0x0030" dtype="U16" access="RW" range-min="0" range-max="1000"/>
                </Registers>
            </Body>
        "#;
        let dict = load_str(xml).unwrap();
        let reg = dict.reg("r1").unwrap();
        assert_eq!(reg.range.min, 0);
        assert_eq!(reg.range.max, 1000);
    }

    #[test]
    fn malformed_address_fails_parse() {
        let xml = r#"
            <Body>
                <Registers>
                    <Register id="r1" address="not-hex" dtype="U16" access="RW"/>
                </Registers>
            </Body>
        "#;
        assert!(matches!(load_str(xml), Err(Error::Parse(_))));
    }

    #[test]
    fn category_and_subcategory_labels_are_collected() {
        let xml = r#"
            <Body>
                <Categories>
                    <Category id="c1">
                        <Labels>
                            <Label lang="en_US">Motion</Label>
                        </Labels>
                        <Subcategories>
                            <Subcategory id="s1">
                                <Labels>
                                    <Label lang="en_US">Velocity loop</Label>
                                </Labels>
                            </Subcategory>
                        </Subcategories>
                    </Category>
                </Categories>
            </Body>
        "#;
        let dict = load_str(xml).unwrap();
        assert_eq!(dict.cat("c1").unwrap().get("en_US").unwrap(), "Motion");
        assert_eq!(dict.scat("c1", "s1").unwrap().get("en_US").unwrap(), "Velocity loop");
    }

    #[test]
    fn register_with_unknown_category_fails() {
        let xml = r#"
            <Body>
                <Registers>
                    <Register id="r1" address="0x0020" dtype="U16" access="RW" cat_id="nope"/>
                </Registers>
            </Body>
        "#;
        assert!(matches!(load_str(xml), Err(Error::Parse(_))));
    }
}
