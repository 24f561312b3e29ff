//! S6: loading a dictionary through the public API end to end.

use mcb_core::dict::{load_str, Dictionary};
use mcb_core::error::Error;

const XML: &str = r#"
    <Body>
        <Categories>
            <Category id="c1">
                <Subcategories>
                    <Subcategory id="s1"/>
                </Subcategories>
            </Category>
        </Categories>
        <Registers>
            <Register id="r1" address="0x0020" dtype="U16" access="RW"
                      range-min="0" range-max="1000" cat_id="c1" scat_id="s1">
                <Labels>
                    <Label lang="en_US">Speed</Label>
                </Labels>
            </Register>
        </Registers>
    </Body>
"#;

#[test]
fn loads_category_subcategory_register_and_labels() {
    let dict: Dictionary = load_str(XML).unwrap();

    assert_eq!(dict.cat_ids(), &["c1".to_string()]);
    assert_eq!(dict.scat_ids("c1").unwrap(), vec!["s1"]);

    let reg = dict.reg("r1").unwrap();
    assert_eq!(reg.address, 0x0020);
    assert_eq!(reg.range.min, 0);
    assert_eq!(reg.range.max, 1000);
    assert_eq!(reg.labels.get("en_US").unwrap(), "Speed");
    assert!(matches!(reg.labels.get("fr_FR"), Err(Error::UnknownLang(_))));
}
