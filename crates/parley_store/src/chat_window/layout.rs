#![forbid(unsafe_code)]

//! Packing of floating chat windows along the bottom edge of the screen.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Widths in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConstants {
	pub window_width: u32,
	pub between_gap: u32,
	pub start_gap: u32,
	pub end_gap: u32,
	pub hidden_menu_width: u32,
}

impl Default for LayoutConstants {
	fn default() -> Self {
		Self {
			window_width: 325,
			between_gap: 5,
			start_gap: 10,
			end_gap: 10,
			hidden_menu_width: 200,
		}
	}
}

impl LayoutConstants {
	fn slot(&self) -> u32 {
		self.window_width.saturating_add(self.between_gap).max(1)
	}

	fn offset_of(&self, index: usize) -> u32 {
		u32::try_from(index)
			.unwrap_or(u32::MAX)
			.saturating_mul(self.slot())
			.saturating_add(self.start_gap)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisibleWindow<T> {
	pub item: T,
	pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HiddenMenu<T> {
	pub items: Vec<T>,
	pub offset: u32,
	pub show_menu: bool,
}

impl<T> Default for HiddenMenu<T> {
	fn default() -> Self {
		Self {
			items: Vec::new(),
			offset: 0,
			show_menu: false,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatWindowLayout<T> {
	pub visible: Vec<VisibleWindow<T>>,
	pub hidden: HiddenMenu<T>,
	pub available_slots: usize,
}

impl<T: PartialEq> ChatWindowLayout<T> {
	pub fn is_visible(&self, item: &T) -> bool {
		self.visible.iter().any(|w| &w.item == item)
	}

	pub fn is_hidden(&self, item: &T) -> bool {
		self.hidden.items.contains(item)
	}
}

/// Lay out `items` in open order.
///
/// On mobile or while the full-screen discuss view is open nothing floats:
/// every item is reported hidden and no menu is shown.
pub fn layout<T: Clone>(
	items: &[T],
	available_width: u32,
	is_mobile: bool,
	full_screen_open: bool,
	constants: &LayoutConstants,
) -> ChatWindowLayout<T> {
	if is_mobile || full_screen_open {
		return ChatWindowLayout {
			visible: Vec::new(),
			hidden: HiddenMenu {
				items: items.to_vec(),
				offset: 0,
				show_menu: false,
			},
			available_slots: 0,
		};
	}

	let relative = available_width.saturating_sub(constants.start_gap.saturating_add(constants.end_gap));
	let max_without_menu = (relative / constants.slot()) as usize;
	let menu = constants.hidden_menu_width.saturating_add(constants.between_gap);
	let max_with_menu = (relative.saturating_sub(menu) / constants.slot()) as usize;

	let visible_prefix = |count: usize| -> Vec<VisibleWindow<T>> {
		items
			.iter()
			.take(count)
			.enumerate()
			.map(|(index, item)| VisibleWindow {
				item: item.clone(),
				offset: constants.offset_of(index),
			})
			.collect()
	};

	if items.len() <= max_without_menu {
		ChatWindowLayout {
			visible: visible_prefix(items.len()),
			hidden: HiddenMenu::default(),
			available_slots: max_without_menu,
		}
	} else if max_with_menu > 0 {
		ChatWindowLayout {
			visible: visible_prefix(max_with_menu),
			hidden: HiddenMenu {
				items: items[max_with_menu..].to_vec(),
				offset: constants.offset_of(max_with_menu),
				show_menu: true,
			},
			available_slots: max_with_menu,
		}
	} else {
		warn!(width = available_width, open = items.len(), "screen too small for chat windows");
		ChatWindowLayout {
			visible: Vec::new(),
			hidden: HiddenMenu {
				items: items.to_vec(),
				offset: constants.start_gap,
				show_menu: true,
			},
			available_slots: 0,
		}
	}
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;

	const C: LayoutConstants = LayoutConstants {
		window_width: 325,
		between_gap: 5,
		start_gap: 10,
		end_gap: 10,
		hidden_menu_width: 200,
	};

	#[test]
	fn room_for_two_but_three_open_shows_one_plus_menu() {
		let l = layout(&[1, 2, 3], 720, false, false, &C);
		assert_eq!(l.visible, vec![VisibleWindow { item: 1, offset: 10 }]);
		assert_eq!(l.hidden.items, vec![2, 3]);
		assert_eq!(l.hidden.offset, 340);
		assert!(l.hidden.show_menu);
		assert_eq!(l.available_slots, 1);
	}

	#[test]
	fn everything_fits_with_plenty_of_room() {
		let l = layout(&["a", "b", "c"], 2000, false, false, &C);
		let offsets: Vec<u32> = l.visible.iter().map(|w| w.offset).collect();
		assert_eq!(offsets, vec![10, 340, 670]);
		assert!(l.hidden.items.is_empty());
		assert!(!l.hidden.show_menu);
		assert_eq!(l.available_slots, 6);
	}

	#[test]
	fn oversized_constants_hide_every_window() {
		let huge = LayoutConstants {
			window_width: u32::MAX,
			between_gap: u32::MAX,
			start_gap: u32::MAX,
			end_gap: u32::MAX,
			hidden_menu_width: u32::MAX,
		};
		let l = layout(&[1, 2], 1920, false, false, &huge);
		assert!(l.visible.is_empty());
		assert_eq!(l.hidden.items, vec![1, 2]);
		assert_eq!(l.available_slots, 0);
	}

	#[test]
	fn single_window_width() {
		let one = layout(&[1], 360, false, false, &C);
		assert_eq!(one.visible.len(), 1);
		assert!(!one.hidden.show_menu);

		let two = layout(&[1, 2], 360, false, false, &C);
		assert!(two.visible.is_empty());
		assert_eq!(two.hidden.items, vec![1, 2]);
		assert_eq!(two.hidden.offset, 10);
		assert!(two.hidden.show_menu);
	}

	#[test]
	fn zero_width_collapses_into_menu() {
		let l = layout(&[1], 0, false, false, &C);
		assert!(l.visible.is_empty());
		assert_eq!(l.hidden.items, vec![1]);
		assert!(l.hidden.show_menu);
		assert_eq!(l.available_slots, 0);

		let empty: ChatWindowLayout<i32> = layout(&[], 0, false, false, &C);
		assert!(empty.visible.is_empty());
		assert!(!empty.hidden.show_menu);
	}

	#[test]
	fn mobile_and_full_screen_hide_everything_without_menu() {
		for (mobile, discuss) in [(true, false), (false, true)] {
			let l = layout(&[1, 2], 4000, mobile, discuss, &C);
			assert!(l.visible.is_empty());
			assert_eq!(l.hidden.items, vec![1, 2]);
			assert!(!l.hidden.show_menu);
			assert_eq!(l.available_slots, 0);
		}
	}

	proptest! {
		#[test]
		fn layout_partitions_items_in_order(count in 0usize..12, width in 0u32..5000) {
			let items: Vec<usize> = (0..count).collect();
			let l = layout(&items, width, false, false, &C);

			let mut seen: Vec<usize> = l.visible.iter().map(|w| w.item).collect();
			seen.extend(l.hidden.items.iter().copied());
			prop_assert_eq!(seen, items);
			prop_assert_eq!(l.hidden.show_menu, !l.hidden.items.is_empty());

			let right_edge = width.saturating_sub(C.end_gap);
			for (index, w) in l.visible.iter().enumerate() {
				prop_assert_eq!(w.offset, C.start_gap + index as u32 * 330);
				prop_assert!(w.offset + C.window_width <= right_edge);
			}
			if l.hidden.show_menu && !l.visible.is_empty() {
				prop_assert!(l.hidden.offset + C.hidden_menu_width <= right_edge);
			}
		}

		#[test]
		fn wider_screens_never_show_fewer_windows(count in 0usize..8, width in 0u32..4000, extra in 0u32..1000) {
			let items: Vec<usize> = (0..count).collect();
			let narrow = layout(&items, width, false, false, &C);
			let wide = layout(&items, width + extra, false, false, &C);
			prop_assert!(wide.visible.len() >= narrow.visible.len());
		}
	}
}
