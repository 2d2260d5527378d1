// src/keyboard.rs
use crate::error::{OscillationError, Result};
use crate::feedback::KeyPresser;

/// Logs keystrokes instead of sending them. Used for `--dry-run` and on
/// platforms without a synthetic-input backend.
#[derive(Debug, Default)]
pub struct ConsolePresser {
    pub pressed: usize,
}

impl KeyPresser for ConsolePresser {
    fn press_key(&mut self, key: char) -> Result<()> {
        self.pressed += 1;
        println!("⌨️  {key}");
        log::info!("key '{key}' (dry run)");
        Ok(())
    }
}

/// Sends a real key down/up pair through `keybd_event`.
#[cfg(windows)]
#[derive(Debug, Default)]
pub struct WindowsPresser;

#[cfg(windows)]
impl KeyPresser for WindowsPresser {
    fn press_key(&mut self, key: char) -> Result<()> {
        use winapi::um::winuser::{keybd_event, VkKeyScanA, KEYEVENTF_KEYUP};

        if !key.is_ascii() {
            return Err(OscillationError::device("press_key", format!("'{key}' is not ASCII")));
        }
        let scan = unsafe { VkKeyScanA(key as u8 as i8) };
        if scan == -1 {
            return Err(OscillationError::device(
                "press_key",
                format!("no virtual key for '{key}' in the current layout"),
            ));
        }
        let vk = (scan & 0xff) as u8;
        unsafe {
            keybd_event(vk, 0, 0, 0);
            keybd_event(vk, 0, KEYEVENTF_KEYUP, 0);
        }
        log::debug!("sent '{key}' (vk {vk:#04x})");
        Ok(())
    }
}

/// Picks the presser for this platform; `dry_run` always logs only.
pub fn default_presser(dry_run: bool) -> Box<dyn KeyPresser> {
    if dry_run {
        return Box::new(ConsolePresser::default());
    }
    platform_presser()
}

#[cfg(windows)]
fn platform_presser() -> Box<dyn KeyPresser> {
    Box::new(WindowsPresser)
}

#[cfg(not(windows))]
fn platform_presser() -> Box<dyn KeyPresser> {
    log::warn!("synthetic key presses are only supported on Windows; logging keys instead");
    Box::new(ConsolePresser::default())
}

/// Rejects characters that cannot be typed as a single key.
pub fn check_key(key: char) -> Result<char> {
    if key.is_ascii_graphic() {
        Ok(key)
    } else {
        Err(OscillationError::Config(format!(
            "feedback key {key:?} must be a printable ASCII character"
        )))
    }
}
