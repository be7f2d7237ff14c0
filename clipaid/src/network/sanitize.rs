const CODE_FENCE: &str = "```";
const MAX_LANGUAGE_TAG_CHARS: usize = 20;
const MAX_LEAD_IN_COLON_CHARS: usize = 60;
const COMMENTARY_LEAD_INS: [&str; 5] = ["Here is", "Here's", "Okay", "Sure", "Certainly"];

/// Removes markdown fences and conversational lead-ins from a completion reply.
///
/// A single cleaning pass can expose another fence or lead-in, so passes are
/// repeated until the text stops changing. Every effective pass shortens the
/// text, which bounds the loop and makes the result a fixed point:
/// `clean(clean(x)) == clean(x)`.
pub fn clean(raw: &str) -> String {
    let mut current = raw.trim();
    loop {
        let next = clean_once(current);
        if next == current {
            return next.to_string();
        }
        current = next;
    }
}

fn clean_once(text: &str) -> &str {
    let unfenced = strip_code_fence(text.trim());
    strip_commentary_lead_in(unfenced)
}

fn strip_code_fence(text: &str) -> &str {
    if text.len() < CODE_FENCE.len() * 2
        || !text.starts_with(CODE_FENCE)
        || !text.ends_with(CODE_FENCE)
    {
        return text;
    }

    let inner = text[CODE_FENCE.len()..text.len() - CODE_FENCE.len()].trim();
    let Some((first_line, rest)) = inner.split_once('\n') else {
        return inner;
    };

    let first_line = first_line.trim();
    if first_line.chars().count() < MAX_LANGUAGE_TAG_CHARS && !first_line.contains(' ') {
        rest.trim()
    } else {
        inner
    }
}

fn strip_commentary_lead_in(text: &str) -> &str {
    let Some(prefix) = COMMENTARY_LEAD_INS
        .iter()
        .find(|prefix| starts_with_ignore_ascii_case(text, prefix))
    else {
        return text;
    };

    let colon = text
        .char_indices()
        .take(MAX_LEAD_IN_COLON_CHARS)
        .find(|(_, ch)| *ch == ':')
        .map(|(byte_index, _)| byte_index);

    match colon {
        Some(byte_index) if byte_index >= prefix.len() => text[byte_index + 1..].trim(),
        _ => text,
    }
}

fn starts_with_ignore_ascii_case(text: &str, prefix: &str) -> bool {
    text.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_plain_code_fence() {
        assert_eq!(clean("```\nThe fixed text.\n```"), "The fixed text.");
    }

    #[test]
    fn strips_language_tag_after_fence() {
        assert_eq!(clean("```text\nHello there, friend.\n```"), "Hello there, friend.");
    }

    #[test]
    fn keeps_first_line_that_looks_like_content() {
        assert_eq!(
            clean("```\nThis is a sentence\nand another one\n```"),
            "This is a sentence\nand another one"
        );
    }

    #[test]
    fn strips_commentary_lead_in() {
        assert_eq!(
            clean("Here's the improved version: Great job!"),
            "Great job!"
        );
        assert_eq!(clean("sure: fine by me"), "fine by me");
    }

    #[test]
    fn keeps_lead_in_when_colon_is_far_away() {
        let text = "Okay so this sentence keeps going for quite a long while before it: ends";
        assert_eq!(clean(text), text);
    }

    #[test]
    fn keeps_text_without_lead_in() {
        assert_eq!(clean("  Note: keep this  "), "Note: keep this");
    }

    #[test]
    fn nested_wrappers_are_removed_in_one_call() {
        let raw = "Sure: ```\nOkay: done\n```";
        assert_eq!(clean(raw), "done");
        assert_eq!(clean(&clean(raw)), "done");
    }

    #[test]
    fn bare_fence_is_left_alone() {
        assert_eq!(clean("```"), "```");
        assert_eq!(clean(""), "");
    }

    #[test]
    fn multibyte_text_does_not_split_characters() {
        assert_eq!(clean("Here is ünïcödé: ✓ fertig"), "✓ fertig");
        assert_eq!(clean("Héllo wörld"), "Héllo wörld");
    }

    proptest! {
        #[test]
        fn clean_is_idempotent(raw in ".{0,200}") {
            let once = clean(&raw);
            prop_assert_eq!(clean(&once), once);
        }

        #[test]
        fn clean_is_idempotent_on_wrapped_replies(
            lead in prop::sample::select(vec!["", "Here is", "here's", "OKAY", "Sure", "Certainly"]),
            tag in "[a-z]{0,8}",
            body in "[ -~\n]{0,80}",
            fenced in any::<bool>(),
        ) {
            let wrapped = if fenced {
                format!("```{tag}\n{body}\n```")
            } else {
                body.clone()
            };
            let raw = format!("{lead}: {wrapped}");
            let once = clean(&raw);
            prop_assert_eq!(clean(&once), once);
        }
    }
}
