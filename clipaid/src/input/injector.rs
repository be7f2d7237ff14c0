use enigo::{
    Direction::{Click, Press, Release},
    Enigo, Key, Keyboard, Mouse, Settings,
};

use crate::input::InputError;
use crate::state::CursorPosition;

#[cfg(target_os = "macos")]
const PASTE_MODIFIER: Key = Key::Meta;
#[cfg(not(target_os = "macos"))]
const PASTE_MODIFIER: Key = Key::Control;

pub struct InputInjector {
    enigo: Enigo,
}

impl InputInjector {
    pub fn new() -> Result<Self, InputError> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|err| InputError::Initialization(err.to_string()))?;

        Ok(Self { enigo })
    }

    /// Presses the platform paste chord (Ctrl+V, or Cmd+V on macOS).
    pub fn paste_shortcut(&mut self) -> Result<(), InputError> {
        self.enigo
            .key(PASTE_MODIFIER, Press)
            .map_err(|err| InputError::Keyboard(err.to_string()))?;

        let pressed = self
            .enigo
            .key(Key::Unicode('v'), Click)
            .map_err(|err| InputError::Keyboard(err.to_string()));

        // Always release the modifier, even if the letter failed.
        let released = self
            .enigo
            .key(PASTE_MODIFIER, Release)
            .map_err(|err| InputError::Keyboard(err.to_string()));

        pressed.and(released)
    }

    pub fn cursor_position(&self) -> Result<CursorPosition, InputError> {
        let (x, y) = self
            .enigo
            .location()
            .map_err(|err| InputError::Cursor(err.to_string()))?;

        Ok(CursorPosition { x, y })
    }
}
