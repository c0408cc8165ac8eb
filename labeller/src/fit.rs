//! `fit`
//!
//! Chooses the largest font size, or barcode module width, that keeps content inside a box.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, LayoutError},
    font::{LabelFont, TextRun},
};

/// The range of font sizes, in pixels, that text may be set in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontSizes {
    /// Smallest size to try.
    pub min_px: u32,
    /// Largest size to try.
    pub max_px: u32,
}

impl Default for FontSizes {
    fn default() -> Self {
        FontSizes {
            min_px: 6,
            max_px: 200,
        }
    }
}

impl FontSizes {
    /// Candidate sizes, largest first.
    pub fn candidates(&self) -> Vec<u32> {
        (self.min_px.max(1)..=self.max_px).rev().collect()
    }

    /// Checks the range is non-empty.
    ///
    /// # Errors
    /// [`ConfigError::InvalidLayout`] for an empty or zero range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_px == 0 || self.min_px > self.max_px {
            return Err(ConfigError::InvalidLayout(format!(
                "font sizes {}..={} are not a usable range",
                self.min_px, self.max_px
            )));
        }
        Ok(())
    }
}

/// The size chosen for a text field and the box it will occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextFit {
    /// Font size in pixels.
    pub font_size: u32,
    /// Width of the rendered ink.
    pub width: u32,
    /// Height of the rendered ink.
    pub height: u32,
}

/// The scale chosen for a barcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarcodeFit {
    /// Width of one module in pixels.
    pub module_width: u32,
    /// Height of every bar in pixels.
    pub bar_height: u32,
    /// Total width of the symbol in pixels.
    pub width: u32,
}

/// Finds the largest candidate size at which `text` fits in a `max_width` × `max_height` box.
///
/// Text is measured at every size with the font's real metrics, largest first, and the first
/// size that fits is taken. Empty or blank text fits at the largest candidate.
///
/// # Arguments
/// * `font`: The font to measure with.
/// * `text`: A single line of text.
/// * `max_width`, `max_height`: The box, in pixels.
/// * `candidates`: Font sizes to consider, in any order.
///
/// # Returns
/// The chosen size and the size of the ink at that size.
///
/// # Errors
/// [`LayoutError::NoFittingSize`] if the text overflows at every candidate size.
pub fn fit_text(
    font: &LabelFont,
    text: &str,
    max_width: u32,
    max_height: u32,
    candidates: &[u32],
) -> Result<TextFit, LayoutError> {
    fit_text_run(font, text, max_width, max_height, candidates).map(|(fit, _)| fit)
}

/// [`fit_text`], also returning the laid-out run so it can be drawn without measuring again.
pub(crate) fn fit_text_run(
    font: &LabelFont,
    text: &str,
    max_width: u32,
    max_height: u32,
    candidates: &[u32],
) -> Result<(TextFit, TextRun), LayoutError> {
    let mut sizes: Vec<u32> = candidates.iter().copied().filter(|size| *size > 0).collect();
    sizes.sort_unstable_by(|a, b| b.cmp(a));
    sizes.dedup();

    for font_size in sizes {
        let run = font.layout(text, font_size);
        if run.width() <= max_width && run.height() <= max_height {
            debug!(
                "{text:?} fits {max_width}x{max_height} at {font_size}px ({}x{})",
                run.width(),
                run.height()
            );
            let fit = TextFit {
                font_size,
                width: run.width(),
                height: run.height(),
            };
            return Ok((fit, run));
        }
    }

    Err(LayoutError::NoFittingSize {
        text: text.to_string(),
        width: max_width,
        height: max_height,
    })
}

/// Scales a barcode of `total_modules` modules to fill a box as widely as whole pixels allow.
///
/// # Arguments
/// * `total_modules`: Width of the symbol in modules.
/// * `max_width`, `max_height`: The box, in pixels.
///
/// # Returns
/// The largest module width with `module_width * total_modules <= max_width`, and bars as
/// tall as the box.
///
/// # Errors
/// [`LayoutError::BarcodeTooWide`] if a single pixel per module is already too wide, or the box
/// has no height.
pub fn fit_barcode(
    total_modules: u32,
    max_width: u32,
    max_height: u32,
) -> Result<BarcodeFit, LayoutError> {
    if total_modules == 0 || total_modules > max_width || max_height == 0 {
        return Err(LayoutError::BarcodeTooWide {
            modules: total_modules,
            max_width,
            max_height,
        });
    }

    let module_width = max_width / total_modules;
    Ok(BarcodeFit {
        module_width,
        bar_height: max_height,
        width: module_width * total_modules,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fit_text_picks_largest_fitting_size() {
        let font = LabelFont::bundled();
        let candidates = FontSizes::default().candidates();
        let fit = fit_text(&font, "CELL BLOCK A", 384, 82, &candidates).unwrap();

        assert!(fit.width <= 384 && fit.height <= 82, "fit inside the box");
        let next = font.layout("CELL BLOCK A", fit.font_size + 1);
        assert!(
            next.width() > 384 || next.height() > 82,
            "one size up would overflow"
        );
    }

    #[test]
    fn test_fit_text_empty_fits_at_largest() {
        let font = LabelFont::bundled();
        let fit = fit_text(&font, "", 1, 1, &[10, 40, 20]).unwrap();
        assert_eq!(
            fit,
            TextFit {
                font_size: 40,
                width: 0,
                height: 0
            }
        );
    }

    #[test]
    fn test_fit_text_no_fitting_size() {
        let font = LabelFont::bundled();
        let err = fit_text(&font, "far too long for this", 20, 10, &[8, 6]).unwrap_err();
        assert_eq!(
            err,
            LayoutError::NoFittingSize {
                text: "far too long for this".to_string(),
                width: 20,
                height: 10
            }
        );
        assert!(fit_text(&font, "x", 100, 100, &[]).is_err(), "no candidates");
    }

    #[test]
    fn test_fit_barcode() {
        assert_eq!(
            fit_barcode(79, 384, 110),
            Ok(BarcodeFit {
                module_width: 4,
                bar_height: 110,
                width: 316
            })
        );
        assert_eq!(fit_barcode(79, 79, 1).unwrap().module_width, 1);
        assert!(
            matches!(
                fit_barcode(80, 79, 10),
                Err(LayoutError::BarcodeTooWide { .. })
            ),
            "one pixel per module is too wide"
        );
        assert!(fit_barcode(10, 100, 0).is_err(), "zero height box");
    }

    #[test]
    fn test_font_sizes() {
        let sizes = FontSizes {
            min_px: 3,
            max_px: 5,
        };
        assert_eq!(sizes.candidates(), vec![5, 4, 3]);
        assert!(sizes.validate().is_ok(), "default sizes are valid");
        assert!(
            FontSizes {
                min_px: 9,
                max_px: 5
            }
            .validate()
            .is_err(),
            "min above max"
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_fit_text_stays_inside_box(
            text in "[A-Za-z0-9 ]{0,12}",
            width in 20u32..400,
            height in 10u32..120,
        ) {
            let font = LabelFont::bundled();
            let candidates: Vec<u32> = (4..=60).rev().collect();
            if let Ok(fit) = fit_text(&font, &text, width, height, &candidates) {
                prop_assert!(fit.width <= width && fit.height <= height, "fit inside the box");
            }
        }

        #[test]
        fn prop_fit_text_is_monotonic(
            text in "[A-Za-z0-9 ]{1,12}",
            width in 20u32..400,
            height in 10u32..120,
            shrink_w in 0u32..20,
            shrink_h in 0u32..10,
        ) {
            let font = LabelFont::bundled();
            let candidates: Vec<u32> = (4..=60).rev().collect();
            let large = fit_text(&font, &text, width, height, &candidates);
            let small = fit_text(&font, &text, width - shrink_w, height - shrink_h, &candidates);
            if let (Ok(large), Ok(small)) = (&large, &small) {
                prop_assert!(small.font_size <= large.font_size, "larger box never smaller font");
            }
            // a smaller box never fits where a larger one does not
            prop_assert!(
                large.is_ok() || small.is_err(),
                "fits in the small box imply fits in the large one"
            );
        }
    }
}
