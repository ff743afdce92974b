//! Standard route and unit code tables used by `EngineConfig::default()`.

use super::{RouteCode, RouteTable, UnitCode, UnitTable};
use std::collections::HashMap;

pub const SNOMED_SYSTEM: &str = "http://snomed.info/sct";
pub const UCUM_SYSTEM: &str = "http://unitsofmeasure.org";

// (name, SNOMED code, display, patient phrase, aliases)
const ROUTES: &[(&str, &str, &str, &str, &[&str])] = &[
    ("oral", "26643006", "Oral route", "by mouth", &["po", "by mouth", "orally", "mouth"]),
    ("sublingual", "37839007", "Sublingual route", "under the tongue", &["sl"]),
    ("buccal", "54471007", "Buccal route", "between the cheek and gum", &[]),
    ("topical", "6064005", "Topical route", "topically", &["skin", "cutaneous", "top"]),
    ("transdermal", "45890007", "Transdermal route", "to the skin", &["td"]),
    ("intravenous", "47625008", "Intravenous route", "intravenously", &["iv"]),
    ("intramuscular", "78421000", "Intramuscular route", "into the muscle", &["im"]),
    ("subcutaneous", "34206005", "Subcutaneous route", "under the skin", &["sc", "subq", "sq"]),
    ("nasal", "46713006", "Nasal route", "in the nose", &["intranasal", "nose"]),
    ("inhalation", "447694001", "Respiratory tract route", "by inhalation", &["inhaled", "inh"]),
    ("ophthalmic", "54485002", "Ophthalmic route", "in the eye", &["eye"]),
    ("otic", "10547007", "Otic route", "in the ear", &["ear"]),
    ("rectal", "37161004", "Rectal route", "rectally", &["pr"]),
    ("vaginal", "16857009", "Vaginal route", "vaginally", &["pv"]),
];

const UNITS: &[(&str, &str)] = &[
    ("tablet", "{tbl}"),
    ("capsule", "{cap}"),
    ("mL", "mL"),
    ("L", "L"),
    ("mg", "mg"),
    ("mcg", "ug"),
    ("g", "g"),
    ("kg", "kg"),
    ("click", "{click}"),
    ("spray", "{spray}"),
    ("pump", "{pump}"),
    ("puff", "{puff}"),
    ("drop", "[drp]"),
    ("patch", "{patch}"),
    ("application", "{application}"),
    ("unit", "[iU]"),
];

pub fn default_route_table() -> RouteTable {
    let mut routes = HashMap::new();
    let mut aliases = HashMap::new();

    for (name, code, display, phrase, route_aliases) in ROUTES {
        routes.insert(name.to_string(), RouteCode {
            system: SNOMED_SYSTEM.to_string(),
            code: code.to_string(),
            display: display.to_string(),
            phrase: phrase.to_string(),
        });
        for alias in route_aliases.iter() {
            aliases.insert(alias.to_string(), name.to_string());
        }
    }

    RouteTable { routes, aliases }
}

pub fn default_unit_table() -> UnitTable {
    let units = UNITS
        .iter()
        .map(|(display, code)| {
            (display.to_string(), UnitCode {
                system: UCUM_SYSTEM.to_string(),
                code: code.to_string(),
            })
        })
        .collect();

    UnitTable { units }
}
