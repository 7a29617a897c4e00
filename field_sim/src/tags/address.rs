//! Brand-specific syntax checks for controller memory addresses.
//!
//! Addresses are only checked for shape, never resolved against a device.
//! Brands we have no patterns for are accepted as-is so that unlisted
//! hardware can still be configured.

use regex::RegexSet;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Controller families with known address syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Brand {
    Siemens,
    AllenBradley,
    Schneider,
    Mitsubishi,
    Omron,
}

impl Brand {
    pub const ALL: [Brand; 5] = [
        Brand::Siemens,
        Brand::AllenBradley,
        Brand::Schneider,
        Brand::Mitsubishi,
        Brand::Omron,
    ];

    /// Resolve a free-form brand name ("Allen-Bradley", "allen_bradley", "Rockwell").
    pub fn from_name(name: &str) -> Option<Brand> {
        let normalized: String = name
            .chars()
            .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '_' | '.' | '/'))
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "siemens" => Some(Brand::Siemens),
            "allenbradley" | "rockwell" | "ab" => Some(Brand::AllenBradley),
            "schneider" | "schneiderelectric" | "modicon" => Some(Brand::Schneider),
            "mitsubishi" | "melsec" => Some(Brand::Mitsubishi),
            "omron" => Some(Brand::Omron),
            _ => None,
        }
    }

    fn patterns(&self) -> &'static [&'static str] {
        match self {
            Brand::Siemens => &[
                r"^DB\d+\.DBX\d+\.[0-7]$",
                r"^DB\d+\.DB[BWD]\d+$",
                r"^[IQEA]\d+\.[0-7]$",
                r"^[IQEAM][BWD]\d+$",
                r"^M\d+\.[0-7]$",
                r"^[TCZ]\d+$",
            ],
            Brand::AllenBradley => &[
                r"^[NFBLSR]\d+:\d+(/\d+)?$",
                r"^[TC]\d+:\d+\.(ACC|PRE|EN|TT|DN|CU|CD|OV|UN)$",
                r"^[IO]:\d+(\.\d+)?(/\d+)?$",
                r"^(Program:[A-Z_]\w*\.)?[A-Z_]\w*(\[\d+(,\d+)*\])?(\.[A-Z_]\w*(\[\d+\])?)*(\.\d+)?$",
            ],
            Brand::Schneider => &[
                r"^%M[WDF]\d+$",
                r"^%M\d+$",
                r"^%[IQ]\d+\.\d+(\.\d+)?$",
                r"^%[IQ]W\d+(\.\d+){0,2}$",
                r"^%S[WD]?\d+$",
                r"^[0-4]\d{4,5}$",
            ],
            Brand::Mitsubishi => &[
                r"^(SM|SD|ZR)\d+$",
                r"^[DMLTCR]\d+$",
                r"^D\d+\.[0-9A-F]$",
                r"^[BW][0-9A-F]+$",
                r"^[XY][0-9A-F]+$",
            ],
            Brand::Omron => &[
                r"^(D|DM|W|H|A|CIO)\d+$",
                r"^(CIO|W|H|A|D)?\d+\.(0\d|1[0-5])$",
                r"^E[0-9A-F]{0,2}_\d+$",
                r"^[TC]\d+$",
            ],
        }
    }

    /// Canonical example addresses, for hinting in configuration forms.
    pub fn examples(&self) -> &'static [&'static str] {
        match self {
            Brand::Siemens => &["DB100.DBD0", "DB1.DBX0.0", "I0.0", "Q0.1", "MW10", "M0.0"],
            Brand::AllenBradley => &["N7:0", "F8:1", "B3:0/1", "T4:0.ACC", "Program:MainProgram.Tag1"],
            Brand::Schneider => &["%MW100", "%MD10", "%I0.1", "%Q0.1", "40001"],
            Brand::Mitsubishi => &["D100", "M100", "X0", "Y10", "SM400"],
            Brand::Omron => &["D100", "CIO100.01", "W10.00", "H5", "E0_100"],
        }
    }

    fn matcher(&self) -> &'static RegexSet {
        // Indexed by discriminant; `ALL` is in declaration order.
        static SETS: OnceLock<Vec<RegexSet>> = OnceLock::new();
        let sets = SETS.get_or_init(|| {
            Brand::ALL
                .iter()
                .map(|brand| {
                    let patterns = brand.patterns().iter().map(|p| format!("(?i){}", p));
                    RegexSet::new(patterns).expect("address patterns are valid regexes")
                })
                .collect()
        });
        &sets[*self as usize]
    }

    /// Whether `address` matches any of this brand's patterns.
    pub fn accepts(&self, address: &str) -> bool {
        self.matcher().is_match(address.trim())
    }
}

/// Check an address against the patterns of `brand`.
///
/// Unknown brands are always valid. Never panics on user input.
pub fn validate_address(brand: &str, address: &str) -> bool {
    match Brand::from_name(brand) {
        Some(brand) => brand.accepts(address),
        None => true,
    }
}

/// Example addresses for `brand`, empty for unknown brands.
pub fn address_examples(brand: &str) -> &'static [&'static str] {
    Brand::from_name(brand).map(|b| b.examples()).unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_examples_pass_their_own_brand() {
        for brand in Brand::ALL {
            for example in brand.examples() {
                assert!(brand.accepts(example), "{:?} rejected its example {}", brand, example);
            }
        }
    }
}
