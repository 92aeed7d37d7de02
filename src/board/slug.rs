//! Stage key derivation.

/// Derive a stage key from a display name.
///
/// Lowercases, folds Latin diacritics to their base letters, turns each
/// whitespace run into one hyphen, drops anything outside `[a-z0-9-]`,
/// collapses repeated hyphens, and trims hyphens from both ends.
/// May return an empty string (e.g. for `"!!!"`); callers reject that.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars().flat_map(char::to_lowercase) {
        if ch.is_whitespace() || ch == '-' {
            push_hyphen(&mut out);
            continue;
        }
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            out.push(ch);
            continue;
        }
        if let Some(folded) = fold(ch) {
            out.push_str(folded);
        }
    }
    out.trim_matches('-').to_string()
}

fn push_hyphen(out: &mut String) {
    if !out.is_empty() && !out.ends_with('-') {
        out.push('-');
    }
}

fn fold(ch: char) -> Option<&'static str> {
    let base = match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'ç' | 'ć' | 'ĉ' | 'č' => "c",
        'ď' | 'đ' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'ğ' | 'ģ' => "g",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => "i",
        'ķ' => "k",
        'ł' | 'ľ' | 'ļ' => "l",
        'ñ' | 'ń' | 'ň' | 'ņ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'ŕ' | 'ř' => "r",
        'ś' | 'š' | 'ş' => "s",
        'ť' | 'ţ' => "t",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' | 'ų' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        'ß' => "ss",
        'æ' => "ae",
        'œ' => "oe",
        _ => return None,
    };
    Some(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_diacritics_and_hyphenates() {
        assert_eq!(slugify("Diagnóstico Inicial"), "diagnostico-inicial");
        assert_eq!(slugify("Negociação"), "negociacao");
        assert_eq!(slugify("Lead Gerado"), "lead-gerado");
    }

    #[test]
    fn drops_punctuation() {
        assert_eq!(slugify("Diagnostico Inicial!!"), "diagnostico-inicial");
        assert_eq!(slugify("R&D (phase 2)"), "rd-phase-2");
    }

    #[test]
    fn collapses_whitespace_runs_and_hyphens() {
        assert_eq!(slugify("  Follow   up  "), "follow-up");
        assert_eq!(slugify("a - b"), "a-b");
        assert_eq!(slugify("--closed--won--"), "closed-won");
        assert_eq!(slugify("tab\tand\nnewline"), "tab-and-newline");
    }

    #[test]
    fn uppercase_accented_letters_fold() {
        assert_eq!(slugify("ÉTAPE Ñ"), "etape-n");
        assert_eq!(slugify("Straße"), "strasse");
    }

    #[test]
    fn emoji_only_name_yields_empty_key() {
        assert_eq!(slugify("🤝"), "");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn slugify_is_idempotent() {
        let once = slugify("Proposta Enviada / Revisão");
        assert_eq!(slugify(&once), once);
    }
}
