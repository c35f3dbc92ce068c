//! SMS segment counting used to price outbound messages.
//!
//! A body that fits the GSM 03.38 default alphabet is sent as GSM-7 (160
//! septets in one segment, 153 per segment when concatenated; extension-table
//! characters take two septets). Anything else is sent as UCS-2 (70 UTF-16
//! code units, 67 when concatenated).

use crate::models::{SegmentInfo, SmsEncoding};

const GSM7_SINGLE: usize = 160;
const GSM7_MULTI: usize = 153;
const UCS2_SINGLE: usize = 70;
const UCS2_MULTI: usize = 67;

const GSM7_BASIC: &str = "@£$¥èéùìòÇ\nØø\rÅåΔ_ΦΓΛΩΠΨΣΘΞÆæßÉ !\"#¤%&'()*+,-./0123456789:;<=>?\
¡ABCDEFGHIJKLMNOPQRSTUVWXYZÄÖÑÜ§¿abcdefghijklmnopqrstuvwxyzäöñüà";

const GSM7_EXTENSION: &str = "\u{000C}^{}\\[~]|€";

/// Septets needed for `c`, or `None` when it is outside the GSM-7 alphabet.
fn gsm7_septets(c: char) -> Option<usize> {
    if GSM7_BASIC.contains(c) {
        Some(1)
    } else if GSM7_EXTENSION.contains(c) {
        Some(2)
    } else {
        None
    }
}

fn segments_for(units: usize, single: usize, multi: usize) -> usize {
    match units {
        0 => 0,
        n if n <= single => 1,
        n => n.div_ceil(multi),
    }
}

pub fn count_segments(body: &str) -> SegmentInfo {
    let septets: Option<usize> = body.chars().map(gsm7_septets).sum();
    match septets {
        Some(units) => SegmentInfo {
            encoding: SmsEncoding::Gsm7,
            units,
            segments: segments_for(units, GSM7_SINGLE, GSM7_MULTI),
        },
        None => {
            let units = body.encode_utf16().count();
            SegmentInfo {
                encoding: SmsEncoding::Ucs2,
                units,
                segments: segments_for(units, UCS2_SINGLE, UCS2_MULTI),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_ascii_fits_one_gsm_segment() {
        let info = count_segments(&"a".repeat(160));
        assert_eq!(info.encoding, SmsEncoding::Gsm7);
        assert_eq!(info.segments, 1);
    }

    #[test]
    fn test_gsm_concatenation_uses_153_septets() {
        assert_eq!(count_segments(&"a".repeat(161)).segments, 2);
        assert_eq!(count_segments(&"a".repeat(306)).segments, 2);
        assert_eq!(count_segments(&"a".repeat(307)).segments, 3);
    }

    #[test]
    fn test_extension_characters_count_double() {
        let info = count_segments(&"€".repeat(80));
        assert_eq!(info.encoding, SmsEncoding::Gsm7);
        assert_eq!(info.units, 160);
        assert_eq!(info.segments, 1);

        let info = count_segments(&format!("{}[", "a".repeat(159)));
        assert_eq!(info.units, 161);
        assert_eq!(info.segments, 2);
    }

    #[test]
    fn test_non_gsm_text_switches_to_ucs2() {
        let info = count_segments("Привет");
        assert_eq!(info.encoding, SmsEncoding::Ucs2);
        assert_eq!(info.units, 6);
        assert_eq!(info.segments, 1);

        assert_eq!(count_segments(&"ж".repeat(70)).segments, 1);
        assert_eq!(count_segments(&"ж".repeat(71)).segments, 2);
        assert_eq!(count_segments(&"ж".repeat(135)).segments, 3);
    }

    #[test]
    fn test_emoji_takes_two_utf16_units() {
        let info = count_segments("hi 😀");
        assert_eq!(info.encoding, SmsEncoding::Ucs2);
        assert_eq!(info.units, 5);
    }

    #[test]
    fn test_empty_body_has_no_segments() {
        assert_eq!(count_segments("").segments, 0);
    }
}
