//! Virtual-keypad resolution.
//!
//! The login screen renders a numeric keypad whose digit-to-button mapping
//! is re-randomized every session; the password field itself rejects
//! keystrokes. The agent reads each button's rendered value text to learn
//! the current mapping, then clicks out the secret digit by digit.

use std::time::Duration;

use tracing::debug;

use crate::config::selectors::KEYPAD_BUTTONS;
use crate::driver::PortalPage;
use crate::error::{AutomationError, Result};

/// Pause between keypad clicks; the portal debounces faster input.
const CLICK_DELAY: Duration = Duration::from_millis(300);

/// The digit-to-button mapping of one rendered keypad.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeypadMapping {
    buttons: Vec<(String, String)>,
}

impl KeypadMapping {
    pub fn new(buttons: Vec<(String, String)>) -> Self {
        Self { buttons }
    }

    /// Selector of the button currently carrying `digit`.
    pub fn button_for(&self, digit: char) -> Option<&str> {
        self.buttons
            .iter()
            .find(|(_, digits)| digits.contains(digit))
            .map(|(selector, _)| selector.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.buttons.is_empty()
    }
}

/// Reads the mapping from the rendered page.
pub async fn read_mapping(page: &dyn PortalPage) -> Result<KeypadMapping> {
    let mut buttons = Vec::new();
    for selector in KEYPAD_BUTTONS {
        if !page.is_visible(selector).await? {
            continue;
        }
        let digits = page.read_value(selector).await?.unwrap_or_default();
        debug!(selector, digits = %digits, "keypad button read");
        buttons.push((selector.to_string(), digits));
    }

    let mapping = KeypadMapping::new(buttons);
    if mapping.is_empty() {
        return Err(AutomationError::Authentication {
            reason: "teclado virtual não encontrado na página de login".to_string(),
        });
    }
    Ok(mapping)
}

/// Clicks the secret's digits in order against the current mapping.
pub async fn click_secret(
    page: &dyn PortalPage,
    mapping: &KeypadMapping,
    secret: &str,
) -> Result<()> {
    for digit in secret.chars() {
        let selector = mapping.button_for(digit).ok_or_else(|| {
            AutomationError::Authentication {
                reason: format!("dígito '{digit}' não encontrado no teclado virtual"),
            }
        })?;
        page.click(selector).await?;
        tokio::time::sleep(CLICK_DELAY).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> KeypadMapping {
        KeypadMapping::new(vec![
            ("#btn1".to_string(), "1 ou 2".to_string()),
            ("#btn2".to_string(), "3 ou 4".to_string()),
            ("#btn3".to_string(), "5 ou 6".to_string()),
            ("#btn4".to_string(), "7 ou 8".to_string()),
            ("#btn5".to_string(), "9 ou 0".to_string()),
        ])
    }

    #[test]
    fn maps_digits_to_the_button_listing_them() {
        let mapping = mapping();
        assert_eq!(mapping.button_for('1'), Some("#btn1"));
        assert_eq!(mapping.button_for('4'), Some("#btn2"));
        assert_eq!(mapping.button_for('0'), Some("#btn5"));
    }

    #[test]
    fn unlisted_digit_has_no_button() {
        let mapping = KeypadMapping::new(vec![("#btn1".to_string(), "1 ou 2".to_string())]);
        assert_eq!(mapping.button_for('7'), None);
    }

    #[test]
    fn empty_mapping_is_detectable() {
        assert!(KeypadMapping::new(Vec::new()).is_empty());
        assert!(!mapping().is_empty());
    }
}
