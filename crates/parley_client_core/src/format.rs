#![forbid(unsafe_code)]

//! Turns what the user typed into the HTML body posted to the backend.

use std::sync::LazyLock;

use regex::Regex;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r#"\b(?:https?://|www\.)[^\s<>"']*[^\s<>"'.,:;!?)\]]"#).expect("valid url regex")
});

/// Shortcut typed by the user, and the emoji it stands for.
pub const EMOJI_SHORTCUTS: &[(&str, &str)] = &[
	(":)", "😊"),
	(":-)", "😊"),
	(":D", "😃"),
	(":-D", "😃"),
	(";)", "😉"),
	(";-)", "😉"),
	(":(", "😞"),
	(":-(", "😞"),
	(":P", "😛"),
	(":-P", "😛"),
	(":O", "😮"),
	(":'(", "😢"),
	(":+1:", "👍"),
	(":-1:", "👎"),
	("o/", "👋"),
];

/// Text as HTML: markup characters and whitespace become entities.
pub fn escape(text: &str) -> String {
	ammonia::clean_text(text)
}

fn emoji_for(word: &str) -> Option<&'static str> {
	EMOJI_SHORTCUTS
		.iter()
		.find(|(shortcut, _)| *shortcut == word)
		.map(|(_, emoji)| *emoji)
}

fn push_link(out: &mut String, url: &str) {
	let href = if url.starts_with("www.") {
		format!("http://{url}")
	} else {
		url.to_string()
	};
	out.push_str(&format!(
		r#"<a href="{}" target="_blank" rel="noreferrer noopener">{}</a>"#,
		escape(&href),
		escape(url)
	));
}

/// One whitespace-free word: an emoji shortcut, or text with bare urls
/// wrapped in anchors.
fn push_word(out: &mut String, word: &str) {
	if let Some(emoji) = emoji_for(word) {
		out.push_str(r#"<span class="o_mail_emoji">"#);
		out.push_str(emoji);
		out.push_str("</span>");
		return;
	}
	let mut last = 0;
	for url in URL_RE.find_iter(word) {
		out.push_str(&escape(&word[last..url.start()]));
		push_link(out, url.as_str());
		last = url.end();
	}
	out.push_str(&escape(&word[last..]));
}

/// Escape, linkify, substitute emojis, and keep line breaks.
pub fn prepare_body(text: &str) -> String {
	let mut out = String::with_capacity(text.len());
	let mut rest = text.trim();
	while !rest.is_empty() {
		let word_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
		let (word, tail) = rest.split_at(word_end);
		push_word(&mut out, word);
		let space_end = tail.find(|c: char| !c.is_whitespace()).unwrap_or(tail.len());
		for c in tail[..space_end].chars() {
			match c {
				'\n' => out.push_str("<br/>"),
				'\r' => {}
				c => out.push(c),
			}
		}
		rest = &tail[space_end..];
	}
	out
}
