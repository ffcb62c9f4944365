//! Strip terminal escape sequences and carriage returns from tool output
//! before it is handed to the LLM collaborator — formatting the model
//! never needs to pay token cost for.

use once_cell::sync::Lazy;
use regex::Regex;

static CSI_OR_OSC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b(\[[0-?]*[ -/]*[@-~]|\][^\x07\x1b]*(\x07|\x1b\\))").unwrap());

pub fn strip_ansi(text: &str) -> String {
    CSI_OR_OSC.replace_all(text, "").replace('\r', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_csi_color_codes() {
        let input = "\x1b[31mred\x1b[0m text";
        assert_eq!(strip_ansi(input), "red text");
    }

    #[test]
    fn strips_osc_sequences() {
        let input = "\x1b]0;title\x07hello";
        assert_eq!(strip_ansi(input), "hello");
    }

    #[test]
    fn removes_carriage_returns() {
        let input = "progress\r100%";
        assert_eq!(strip_ansi(input), "progress100%");
    }

    #[test]
    fn leaves_clean_text_untouched() {
        assert_eq!(strip_ansi("plain text"), "plain text");
    }
}
