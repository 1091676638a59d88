#![forbid(unsafe_code)]

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::Store;
use crate::entities::Partner;

/// Lower-cased text with diacritics stripped (`"Émile"` -> `"emile"`).
pub fn unaccent(text: &str) -> String {
	text.nfd().filter(|c| !is_combining_mark(*c)).collect::<String>().to_lowercase()
}

impl Store {
	/// Locally known partners whose name contains `keyword`, ignoring case
	/// and accents. Excludes the current and the public partner.
	pub fn search_partners(&self, keyword: &str, limit: usize) -> Vec<&Partner> {
		let needle = unaccent(keyword.trim());
		let me = self.current_partner();
		let public = self.public_partner();
		let mut found: Vec<&Partner> = self
			.partners()
			.filter(|p| p.identity != me && Some(&p.identity) != public)
			.filter(|p| p.name.as_deref().is_some_and(|name| unaccent(name).contains(&needle)))
			.collect();
		found.sort_by_cached_key(|p| (unaccent(p.display_name()), p.id));
		found.truncate(limit);
		found
	}
}
