//! SGR (Select Graphic Rendition) attribute state.
//!
//! Ported from the original terminal emulator's `sgrState`: color mode for
//! foreground/background/underline is packed into one byte
//! (`0b00uubbff` — underline, background, foreground, 2 bits each) and the
//! boolean attributes (bold, dim, italic, ...) are a second bitmask. Raw
//! color bytes are kept exactly as the incoming SGR parameter so that
//! re-emitting a snapshot (§4.5) only has to replay the same numbers, not
//! reconstruct them.

use crate::errors::SgrError;

/// Color-mode tags packed two bits at a time into [`SgrState::color_type`].
pub const COLOR_16: u8 = 1;
pub const COLOR_256: u8 = 2;
pub const COLOR_16M: u8 = 3;

pub const FLAG_BOLD: u8 = 1 << 0;
pub const FLAG_DIM: u8 = 1 << 1;
pub const FLAG_ITALIC: u8 = 1 << 2;
pub const FLAG_UNDERLINE: u8 = 1 << 3;
pub const FLAG_BLINK: u8 = 1 << 4;
pub const FLAG_INVERSE: u8 = 1 << 5;
pub const FLAG_INVISIBLE: u8 = 1 << 6;
pub const FLAG_STRIKE: u8 = 1 << 7;

/// Current graphic-rendition attributes, carried forward cell by cell as a
/// terminal prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SgrState {
    pub fg: [u8; 3],
    pub bg: [u8; 3],
    pub ul: [u8; 3],
    /// `0b00uubbff`: underline mode, background mode, foreground mode.
    pub color_type: u8,
    pub flags: u8,
}

impl SgrState {
    pub fn fg_mode(&self) -> u8 {
        self.color_type & 0b11
    }

    pub fn bg_mode(&self) -> u8 {
        (self.color_type >> 2) & 0b11
    }

    pub fn ul_mode(&self) -> u8 {
        (self.color_type >> 4) & 0b11
    }

    /// Apply a run of SGR parameters (the numbers between `CSI` and the
    /// final `m`), in order, exactly as the original `sgrState.set` does.
    /// An empty parameter list resets to defaults, matching a bare `CSI m`.
    /// On an unrecognized code, returns an error but leaves the successfully
    /// applied prefix in place — the caller (the terminal's CSI handler)
    /// decides whether that is fatal to the call, never to the stream.
    pub fn apply(&mut self, params: &[u32]) -> Result<(), SgrError> {
        if params.is_empty() {
            *self = SgrState::default();
            return Ok(());
        }
        let mut i = 0;
        while i < params.len() {
            let c = params[i];
            let sub = &params[i..];
            match c {
                0 => *self = SgrState::default(),
                1 => self.flags |= FLAG_BOLD,
                21 => {} // double underline, not modeled
                2 => self.flags |= FLAG_DIM,
                22 => self.flags &= !(FLAG_DIM | FLAG_BOLD),
                3 => self.flags |= FLAG_ITALIC,
                23 => self.flags &= !FLAG_ITALIC,
                4 => self.flags |= FLAG_UNDERLINE,
                24 => self.flags &= !FLAG_UNDERLINE,
                5 => self.flags |= FLAG_BLINK,
                25 => self.flags &= !FLAG_BLINK,
                7 => self.flags |= FLAG_INVERSE,
                27 => self.flags &= !FLAG_INVERSE,
                8 => self.flags |= FLAG_INVISIBLE,
                28 => self.flags &= !FLAG_INVISIBLE,
                9 => self.flags |= FLAG_STRIKE,
                29 => self.flags &= !FLAG_STRIKE,
                90..=97 => {
                    self.color_type = (self.color_type & 0b1111_1100) | COLOR_16;
                    self.fg[0] = c as u8;
                }
                100..=107 => {
                    self.color_type = (self.color_type & 0b1111_0011) | (COLOR_16 << 2);
                    self.bg[0] = c as u8;
                }
                30..=37 => {
                    self.color_type = (self.color_type & 0b1111_1100) | COLOR_16;
                    self.fg[0] = c as u8;
                }
                39 => self.color_type &= 0b1111_1100,
                40..=47 => {
                    self.color_type = (self.color_type & 0b1111_0011) | (COLOR_16 << 2);
                    self.bg[0] = c as u8;
                }
                49 => self.color_type &= 0b1111_0011,
                38 if sub.len() >= 3 && sub[1] == 5 => {
                    self.color_type = (self.color_type & 0b1111_1100) | COLOR_256;
                    self.fg[0] = sub[2] as u8;
                    i += 2;
                }
                48 if sub.len() >= 3 && sub[1] == 5 => {
                    self.color_type = (self.color_type & 0b1111_0011) | (COLOR_256 << 2);
                    self.bg[0] = sub[2] as u8;
                    i += 2;
                }
                38 if sub.len() >= 5 && sub[1] == 2 => {
                    self.color_type = (self.color_type & 0b1111_1100) | COLOR_16M;
                    self.fg = [sub[2] as u8, sub[3] as u8, sub[4] as u8];
                    i += 4;
                }
                48 if sub.len() >= 5 && sub[1] == 2 => {
                    self.color_type = (self.color_type & 0b1111_0011) | (COLOR_16M << 2);
                    self.bg = [sub[2] as u8, sub[3] as u8, sub[4] as u8];
                    i += 4;
                }
                58 if sub.len() >= 3 && sub[1] == 5 => {
                    self.color_type = (self.color_type & 0b1100_1111) | (COLOR_256 << 4);
                    self.ul[0] = sub[2] as u8;
                    i += 2;
                }
                58 if sub.len() >= 5 && sub[1] == 2 => {
                    self.color_type = (self.color_type & 0b1100_1111) | (COLOR_16M << 4);
                    self.ul = [sub[2] as u8, sub[3] as u8, sub[4] as u8];
                    i += 4;
                }
                59 => self.color_type &= 0b1100_1111,
                53 | 55 => {} // overline on/off, not modeled
                other => return Err(SgrError::UnknownCode(other)),
            }
            i += 1;
        }
        Ok(())
    }

    /// Parameters (after the `38;`/`48;` prefix) needed to reproduce the
    /// current foreground in a snapshot. `None` for 16-color and default,
    /// since those are carried by the raw code itself (see
    /// [`SgrState::fg_code`]).
    pub fn fg_extended_params(&self) -> Option<Vec<u32>> {
        match self.fg_mode() {
            COLOR_256 => Some(vec![38, 5, u32::from(self.fg[0])]),
            COLOR_16M => Some(vec![
                38,
                2,
                u32::from(self.fg[0]),
                u32::from(self.fg[1]),
                u32::from(self.fg[2]),
            ]),
            _ => None,
        }
    }

    pub fn bg_extended_params(&self) -> Option<Vec<u32>> {
        match self.bg_mode() {
            COLOR_256 => Some(vec![48, 5, u32::from(self.bg[0])]),
            COLOR_16M => Some(vec![
                48,
                2,
                u32::from(self.bg[0]),
                u32::from(self.bg[1]),
                u32::from(self.bg[2]),
            ]),
            _ => None,
        }
    }

    /// The raw 16-color SGR code (e.g. `31`, `94`) if `fg_mode()` is
    /// `COLOR_16`.
    pub fn fg_code(&self) -> Option<u8> {
        (self.fg_mode() == COLOR_16).then_some(self.fg[0])
    }

    pub fn bg_code(&self) -> Option<u8> {
        (self.bg_mode() == COLOR_16).then_some(self.bg[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_params_resets() {
        let mut s = SgrState {
            flags: FLAG_BOLD,
            ..Default::default()
        };
        s.apply(&[]).unwrap();
        assert_eq!(s, SgrState::default());
    }

    #[test]
    fn bold_then_reset_all() {
        let mut s = SgrState::default();
        s.apply(&[1]).unwrap();
        assert_eq!(s.flags & FLAG_BOLD, FLAG_BOLD);
        s.apply(&[0]).unwrap();
        assert_eq!(s.flags, 0);
    }

    #[test]
    fn dim_and_bold_both_cleared_by_22() {
        let mut s = SgrState::default();
        s.apply(&[1, 2]).unwrap();
        s.apply(&[22]).unwrap();
        assert_eq!(s.flags & (FLAG_BOLD | FLAG_DIM), 0);
    }

    #[test]
    fn basic_16_color_fg() {
        let mut s = SgrState::default();
        s.apply(&[31]).unwrap();
        assert_eq!(s.fg_mode(), COLOR_16);
        assert_eq!(s.fg_code(), Some(31));
    }

    #[test]
    fn bright_16_color_bg() {
        let mut s = SgrState::default();
        s.apply(&[104]).unwrap();
        assert_eq!(s.bg_mode(), COLOR_16);
        assert_eq!(s.bg_code(), Some(104));
    }

    #[test]
    fn indexed_256_fg_consumes_three_params() {
        let mut s = SgrState::default();
        s.apply(&[38, 5, 200, 1]).unwrap();
        assert_eq!(s.fg_mode(), COLOR_256);
        assert_eq!(s.fg[0], 200);
        assert_eq!(s.flags & FLAG_BOLD, FLAG_BOLD);
    }

    #[test]
    fn truecolor_bg_consumes_five_params() {
        let mut s = SgrState::default();
        s.apply(&[48, 2, 10, 20, 30]).unwrap();
        assert_eq!(s.bg_mode(), COLOR_16M);
        assert_eq!(s.bg, [10, 20, 30]);
    }

    #[test]
    fn default_fg_bg_reset_only_their_own_bits() {
        let mut s = SgrState::default();
        s.apply(&[31, 41]).unwrap();
        s.apply(&[39]).unwrap();
        assert_eq!(s.fg_mode(), 0);
        assert_eq!(s.bg_mode(), COLOR_16);
    }

    #[test]
    fn unknown_code_is_an_error() {
        let mut s = SgrState::default();
        assert!(s.apply(&[31, 12345]).is_err());
        // the 31 before it still applied
        assert_eq!(s.fg_code(), Some(31));
    }

    #[test]
    fn underline_color_256() {
        let mut s = SgrState::default();
        s.apply(&[58, 5, 7]).unwrap();
        assert_eq!(s.ul_mode(), COLOR_256);
        assert_eq!(s.ul[0], 7);
        s.apply(&[59]).unwrap();
        assert_eq!(s.ul_mode(), 0);
    }
}
