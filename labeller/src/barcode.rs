//! `barcode`
//!
//! Code 128 encoding. Printable ASCII goes through code set B, runs of digits are packed two
//! per symbol with code set C.

use std::fmt;

use crate::error::LayoutError;

/// Bar/space widths of every Code 128 symbol, indexed by symbol value.
/// Values 103 to 105 are the start codes, 106 is the stop pattern.
const PATTERNS: [&[u8]; 107] = [
    b"212222", b"222122", b"222221", b"121223", b"121322", b"131222", b"122213", b"122312",
    b"132212", b"221213", b"221312", b"231212", b"112232", b"122132", b"122231", b"113222",
    b"123122", b"123221", b"223211", b"221132", b"221231", b"213212", b"223112", b"312131",
    b"311222", b"321122", b"321221", b"312212", b"322112", b"322211", b"212123", b"212321",
    b"232121", b"111323", b"131123", b"131321", b"112313", b"132113", b"132311", b"211313",
    b"231113", b"231311", b"112133", b"112331", b"132131", b"113123", b"113321", b"133121",
    b"313121", b"211331", b"231131", b"213113", b"213311", b"213131", b"311123", b"311321",
    b"331121", b"312113", b"312311", b"332111", b"314111", b"221411", b"431111", b"111224",
    b"111422", b"121124", b"121421", b"141122", b"141221", b"112214", b"112412", b"122114",
    b"122411", b"142112", b"142211", b"241211", b"221114", b"413111", b"241112", b"134111",
    b"111242", b"121142", b"121241", b"114212", b"124112", b"124211", b"411212", b"421112",
    b"421211", b"212141", b"214121", b"412121", b"111143", b"111341", b"131141", b"114113",
    b"114311", b"411113", b"411311", b"113141", b"114131", b"311141", b"411131", b"211412",
    b"211214", b"211232", b"2331112",
];

/// Switches from code set B to code set C.
const CODE_C: u8 = 99;
/// Switches from code set C to code set B.
const CODE_B: u8 = 100;
const START_B: u8 = 104;
const START_C: u8 = 105;
const STOP: u8 = 106;

/// Modules in every symbol except the stop pattern.
pub const MODULES_PER_SYMBOL: u32 = 11;
/// Modules in the stop pattern, including its final bar.
pub const STOP_MODULES: u32 = 13;

/// A run of identical modules: one bar or one space of the symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleRun {
    /// `true` for a bar, `false` for a space.
    pub is_bar: bool,
    /// Width of the run in modules.
    pub modules: u32,
}

/// An encoded barcode: alternating bars and spaces, starting and ending with a bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// The symbol values, start code through stop code.
    values: Vec<u8>,
    /// The values expanded into bars and spaces.
    runs: Vec<ModuleRun>,
}

impl Symbol {
    /// The bars and spaces, left to right.
    pub fn runs(&self) -> &[ModuleRun] {
        &self.runs
    }

    /// The symbol values including start, check and stop codes.
    pub fn values(&self) -> &[u8] {
        &self.values
    }

    /// Total width of the symbol in modules.
    pub fn total_modules(&self) -> u32 {
        self.runs.iter().map(|run| run.modules).sum()
    }
}

impl fmt::Display for Symbol {
    /// Writes one character per module, `1` for bars and `0` for spaces.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for run in &self.runs {
            let c = if run.is_bar { '1' } else { '0' };
            for _ in 0..run.modules {
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodeSet {
    B,
    C,
}

/// Checks that every character of `payload` is encodable.
///
/// # Errors
/// [`LayoutError::UnsupportedCharacter`] for the first character outside printable ASCII.
pub fn check_payload(payload: &str) -> Result<(), LayoutError> {
    match payload
        .chars()
        .enumerate()
        .find(|(_, c)| !(' '..='~').contains(c))
    {
        Some((position, character)) => Err(LayoutError::UnsupportedCharacter {
            character,
            position,
        }),
        None => Ok(()),
    }
}

/// Encodes `payload` as a Code 128 symbol.
///
/// The same payload always produces the same symbol.
///
/// # Arguments
/// * `payload`: Printable ASCII to encode.
///
/// # Returns
/// The encoded [`Symbol`], including check character and stop pattern.
///
/// # Errors
/// [`LayoutError::UnsupportedCharacter`] if the payload contains anything outside `' '..='~'`.
pub fn encode(payload: &str) -> Result<Symbol, LayoutError> {
    check_payload(payload)?;
    let bytes = payload.as_bytes();

    let leading_digits = digit_run(bytes);
    let mut set = if leading_digits >= 4 || (leading_digits == 2 && bytes.len() == 2) {
        CodeSet::C
    } else {
        CodeSet::B
    };

    let mut values = Vec::with_capacity(bytes.len() + 3);
    values.push(match set {
        CodeSet::B => START_B,
        CodeSet::C => START_C,
    });

    let mut i = 0;
    while i < bytes.len() {
        match set {
            CodeSet::C => {
                if digit_run(&bytes[i..]) >= 2 {
                    values.push((bytes[i] - b'0') * 10 + (bytes[i + 1] - b'0'));
                    i += 2;
                } else {
                    values.push(CODE_B);
                    set = CodeSet::B;
                }
            }
            CodeSet::B => {
                let run = digit_run(&bytes[i..]);
                if run >= 6 || (run >= 4 && i + run == bytes.len()) {
                    // an odd run leaves its first digit in set B
                    if run % 2 == 1 {
                        values.push(bytes[i] - b' ');
                        i += 1;
                    }
                    values.push(CODE_C);
                    set = CodeSet::C;
                } else {
                    values.push(bytes[i] - b' ');
                    i += 1;
                }
            }
        }
    }

    values.push(checksum(&values));
    values.push(STOP);

    let runs = values
        .iter()
        .flat_map(|value| PATTERNS[usize::from(*value)].iter().enumerate())
        .map(|(index, width)| ModuleRun {
            is_bar: index % 2 == 0,
            modules: u32::from(width - b'0'),
        })
        .collect();

    Ok(Symbol { values, runs })
}

/// Number of ASCII digits at the start of `bytes`.
fn digit_run(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

/// Mod 103 check value over the start code and data values.
fn checksum(values: &[u8]) -> u8 {
    let sum: usize = values
        .iter()
        .enumerate()
        .map(|(position, value)| position.max(1) * usize::from(*value))
        .sum();
    #[allow(clippy::cast_possible_truncation)]
    let check = (sum % 103) as u8;
    check
}
