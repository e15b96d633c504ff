//! Modifier kinds, masks, and the live modifier state.
//!
//! One fixed-width bit set covers every modifier the engine knows about:
//! four physical modifiers, three lock flags, and 256 user-defined virtual
//! slots (`M00..MFF`). Rule matching is two mask operations, so the hot path
//! pays a handful of word compares per rule.

use bitflags::bitflags;
use std::fmt;

// -------------------------------------------------------------------------------------------------
// Modifier kinds
// -------------------------------------------------------------------------------------------------

/// Physical modifiers driven by keyboard modifier keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalMod {
    Shift,
    Control,
    Alt,
    Meta,
}

impl PhysicalMod {
    /// Parse a modifier token as written in `from` expressions. `Ctrl` and
    /// `Control` are interchangeable, as are `Win`, `Windows`, and `Meta`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Shift" => Some(Self::Shift),
            "Ctrl" | "Control" => Some(Self::Control),
            "Alt" => Some(Self::Alt),
            "Win" | "Windows" | "Meta" => Some(Self::Meta),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Shift => "Shift",
            Self::Control => "Control",
            Self::Alt => "Alt",
            Self::Meta => "Meta",
        }
    }
}

/// Lock modifiers. The state bit flips on trigger-key press, never release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMod {
    CapsLock,
    NumLock,
    ScrollLock,
}

impl LockMod {
    pub const fn name(self) -> &'static str {
        match self {
            Self::CapsLock => "CapsLock",
            Self::NumLock => "NumLock",
            Self::ScrollLock => "ScrollLock",
        }
    }
}

/// Any modifier the mask can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModifierKind {
    Physical(PhysicalMod),
    Lock(LockMod),
    /// One of the 256 virtual slots, asserted by a tap/hold trigger.
    Virtual(u8),
}

impl ModifierKind {
    /// Parse a token from a hyphen-separated `from` expression: a physical
    /// modifier name or a virtual slot (`M00`..`MFF`, hex digits in either
    /// case).
    pub fn parse_expr_token(token: &str) -> Option<Self> {
        if let Some(phys) = PhysicalMod::from_name(token) {
            return Some(Self::Physical(phys));
        }
        parse_virtual_name(token).map(Self::Virtual)
    }
}

/// Parse a virtual modifier name (`M3A` -> slot `0x3A`). Exactly one `M`
/// followed by two hex digits.
pub fn parse_virtual_name(name: &str) -> Option<u8> {
    let rest = name.strip_prefix('M')?;
    if rest.len() != 2 || !rest.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(rest, 16).ok()
}

bitflags! {
    /// Physical + lock bits. Virtual slots live in the word array alongside.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BaseMods: u16 {
        const SHIFT       = 1 << 0;
        const CONTROL     = 1 << 1;
        const ALT         = 1 << 2;
        const META        = 1 << 3;
        const CAPS_LOCK   = 1 << 4;
        const NUM_LOCK    = 1 << 5;
        const SCROLL_LOCK = 1 << 6;
    }
}

impl From<PhysicalMod> for BaseMods {
    fn from(value: PhysicalMod) -> Self {
        match value {
            PhysicalMod::Shift => BaseMods::SHIFT,
            PhysicalMod::Control => BaseMods::CONTROL,
            PhysicalMod::Alt => BaseMods::ALT,
            PhysicalMod::Meta => BaseMods::META,
        }
    }
}

impl From<LockMod> for BaseMods {
    fn from(value: LockMod) -> Self {
        match value {
            LockMod::CapsLock => BaseMods::CAPS_LOCK,
            LockMod::NumLock => BaseMods::NUM_LOCK,
            LockMod::ScrollLock => BaseMods::SCROLL_LOCK,
        }
    }
}

// -------------------------------------------------------------------------------------------------
// ModifierMask
// -------------------------------------------------------------------------------------------------

/// Fixed-width modifier bit set: the physical/lock flags plus 256 virtual
/// bits. Used both as the live held-set and as `required_on`/`required_off`
/// rule masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ModifierMask {
    base: BaseMods,
    virt: [u64; 4],
}

impl ModifierMask {
    pub const EMPTY: Self = Self {
        base: BaseMods::empty(),
        virt: [0; 4],
    };

    pub fn insert(&mut self, kind: ModifierKind) {
        match kind {
            ModifierKind::Physical(p) => self.base |= BaseMods::from(p),
            ModifierKind::Lock(l) => self.base |= BaseMods::from(l),
            ModifierKind::Virtual(slot) => self.virt[slot as usize / 64] |= 1u64 << (slot % 64),
        }
    }

    pub fn remove(&mut self, kind: ModifierKind) {
        match kind {
            ModifierKind::Physical(p) => self.base &= !BaseMods::from(p),
            ModifierKind::Lock(l) => self.base &= !BaseMods::from(l),
            ModifierKind::Virtual(slot) => self.virt[slot as usize / 64] &= !(1u64 << (slot % 64)),
        }
    }

    pub fn contains(&self, kind: ModifierKind) -> bool {
        match kind {
            ModifierKind::Physical(p) => self.base.contains(BaseMods::from(p)),
            ModifierKind::Lock(l) => self.base.contains(BaseMods::from(l)),
            ModifierKind::Virtual(slot) => self.virt[slot as usize / 64] & (1u64 << (slot % 64)) != 0,
        }
    }

    #[must_use]
    pub fn with(mut self, kind: ModifierKind) -> Self {
        self.insert(kind);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty() && self.virt.iter().all(|w| *w == 0)
    }

    /// Number of set bits; the rule-specificity metric.
    pub fn popcount(&self) -> u32 {
        self.base.bits().count_ones() + self.virt.iter().map(|w| w.count_ones()).sum::<u32>()
    }

    /// `self` contains every bit of `other`.
    pub fn contains_all(&self, other: &Self) -> bool {
        self.base.contains(other.base)
            && self
                .virt
                .iter()
                .zip(other.virt.iter())
                .all(|(a, b)| a & b == *b)
    }

    /// Bits of `self` not present in `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        let mut virt = self.virt;
        for (w, r) in virt.iter_mut().zip(other.virt.iter()) {
            *w &= !r;
        }
        Self {
            base: self.base & !other.base,
            virt,
        }
    }

    /// `self` and `other` share at least one bit.
    pub fn intersects(&self, other: &Self) -> bool {
        self.base.intersects(other.base)
            || self
                .virt
                .iter()
                .zip(other.virt.iter())
                .any(|(a, b)| a & b != 0)
    }

    /// Iterate the set kinds in a stable order (physical, locks, virtual).
    pub fn iter_kinds(&self) -> impl Iterator<Item = ModifierKind> + '_ {
        let phys = [
            PhysicalMod::Shift,
            PhysicalMod::Control,
            PhysicalMod::Alt,
            PhysicalMod::Meta,
        ]
        .into_iter()
        .filter(|p| self.base.contains(BaseMods::from(*p)))
        .map(ModifierKind::Physical);
        let locks = [LockMod::CapsLock, LockMod::NumLock, LockMod::ScrollLock]
            .into_iter()
            .filter(|l| self.base.contains(BaseMods::from(*l)))
            .map(ModifierKind::Lock);
        let virt = (0u16..256).filter_map(|slot| {
            let slot = slot as u8;
            (self.virt[slot as usize / 64] & (1u64 << (slot % 64)) != 0)
                .then_some(ModifierKind::Virtual(slot))
        });
        phys.chain(locks).chain(virt)
    }
}

impl std::ops::BitOr for ModifierMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        let mut virt = self.virt;
        for (w, r) in virt.iter_mut().zip(rhs.virt.iter()) {
            *w |= r;
        }
        Self {
            base: self.base | rhs.base,
            virt,
        }
    }
}

impl std::ops::BitOrAssign for ModifierMask {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

impl fmt::Display for ModifierMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for kind in self.iter_kinds() {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            match kind {
                ModifierKind::Physical(p) => write!(f, "{}", p.name())?,
                ModifierKind::Lock(l) => write!(f, "{}", l.name())?,
                ModifierKind::Virtual(slot) => write!(f, "M{slot:02X}")?,
            }
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------
// ModifierState
// -------------------------------------------------------------------------------------------------

/// The live modifier state owned by the hot-path processor.
///
/// Physical bits follow key press/release, lock bits flip on trigger press,
/// and virtual bits are set exclusively by the tap/hold detector. Other
/// threads only ever see copies taken via [`ModifierState::snapshot`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifierState {
    held: ModifierMask,
}

impl ModifierState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, kind: PhysicalMod) {
        self.held.insert(ModifierKind::Physical(kind));
    }

    pub fn release(&mut self, kind: PhysicalMod) {
        self.held.remove(ModifierKind::Physical(kind));
    }

    /// Lock semantics: flips on trigger press only.
    pub fn toggle(&mut self, kind: LockMod) {
        let as_kind = ModifierKind::Lock(kind);
        if self.held.contains(as_kind) {
            self.held.remove(as_kind);
        } else {
            self.held.insert(as_kind);
        }
    }

    pub fn set_virtual(&mut self, slot: u8, asserted: bool) {
        let kind = ModifierKind::Virtual(slot);
        if asserted {
            self.held.insert(kind);
        } else {
            self.held.remove(kind);
        }
    }

    /// The rule-matching predicate:
    /// `(state & required_on) == required_on && (state & required_off) == 0`.
    pub fn matches(&self, required_on: &ModifierMask, required_off: &ModifierMask) -> bool {
        self.held.contains_all(required_on) && !self.held.intersects(required_off)
    }

    pub fn snapshot(&self) -> ModifierMask {
        self.held
    }

    pub fn clear(&mut self) {
        self.held = ModifierMask::EMPTY;
    }
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_masks_always_match() {
        let mut state = ModifierState::new();
        assert!(state.matches(&ModifierMask::EMPTY, &ModifierMask::EMPTY));
        state.press(PhysicalMod::Shift);
        state.set_virtual(0x7F, true);
        assert!(state.matches(&ModifierMask::EMPTY, &ModifierMask::EMPTY));
    }

    #[test]
    fn matches_requires_on_and_forbids_off() {
        let mut state = ModifierState::new();
        state.press(PhysicalMod::Control);
        state.set_virtual(0x00, true);

        let on = ModifierMask::EMPTY
            .with(ModifierKind::Physical(PhysicalMod::Control))
            .with(ModifierKind::Virtual(0x00));
        let off = ModifierMask::EMPTY.with(ModifierKind::Physical(PhysicalMod::Shift));
        assert!(state.matches(&on, &off));

        state.press(PhysicalMod::Shift);
        assert!(!state.matches(&on, &off));
    }

    #[test]
    fn lock_toggle_flips() {
        let mut state = ModifierState::new();
        state.toggle(LockMod::CapsLock);
        assert!(state.snapshot().contains(ModifierKind::Lock(LockMod::CapsLock)));
        state.toggle(LockMod::CapsLock);
        assert!(!state.snapshot().contains(ModifierKind::Lock(LockMod::CapsLock)));
    }

    #[test]
    fn virtual_slots_cover_full_range() {
        let mut mask = ModifierMask::EMPTY;
        for slot in [0x00u8, 0x3F, 0x40, 0x7F, 0x80, 0xFF] {
            mask.insert(ModifierKind::Virtual(slot));
        }
        assert_eq!(mask.popcount(), 6);
        for slot in [0x00u8, 0x3F, 0x40, 0x7F, 0x80, 0xFF] {
            assert!(mask.contains(ModifierKind::Virtual(slot)));
        }
        assert!(!mask.contains(ModifierKind::Virtual(0x01)));
    }

    #[test]
    fn popcount_counts_both_halves() {
        let mask = ModifierMask::EMPTY
            .with(ModifierKind::Physical(PhysicalMod::Shift))
            .with(ModifierKind::Lock(LockMod::NumLock))
            .with(ModifierKind::Virtual(0xA0));
        assert_eq!(mask.popcount(), 3);
    }

    #[test]
    fn virtual_name_parsing() {
        assert_eq!(parse_virtual_name("M00"), Some(0x00));
        assert_eq!(parse_virtual_name("M3a"), Some(0x3A));
        assert_eq!(parse_virtual_name("MFF"), Some(0xFF));
        assert_eq!(parse_virtual_name("M0"), None);
        assert_eq!(parse_virtual_name("M100"), None);
        assert_eq!(parse_virtual_name("N00"), None);
        assert_eq!(parse_virtual_name("MGG"), None);
    }

    #[test]
    fn mask_display_renders_names_and_slots() {
        let mask = ModifierMask::EMPTY
            .with(ModifierKind::Physical(PhysicalMod::Shift))
            .with(ModifierKind::Virtual(0x00));
        assert_eq!(mask.to_string(), "Shift M00");
    }
}
