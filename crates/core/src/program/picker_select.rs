use super::{InputEvent, Key, ModeCtx, ModeResult, Transition};
use crate::{select_pickers, Align, Picker, ResolvedConfig, SessionError};

const MAX_WEIGHT: u32 = 9;
const SELECTION_NAME: &str = "Selection";

#[derive(Debug, Clone)]
struct Entry {
    picker: Picker,
    selected: bool,
    weight: u32,
}

/// Checkbox list of the configured pickers, each with a small weight.
#[derive(Debug, Clone)]
pub struct PickerSelectMode {
    entries: Vec<Entry>,
    cursor: usize,
}

impl PickerSelectMode {
    pub fn new(config: &ResolvedConfig) -> Self {
        let entries = config
            .pickers
            .iter()
            .map(|picker| Entry {
                picker: picker.clone(),
                selected: false,
                weight: 1,
            })
            .collect();
        Self { entries, cursor: 0 }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The selected pickers with their weights.
    pub fn choices(&self) -> Vec<(Picker, f64)> {
        self.entries
            .iter()
            .filter(|entry| entry.selected)
            .map(|entry| (entry.picker.clone(), f64::from(entry.weight)))
            .collect()
    }

    pub(super) fn activate(&mut self, ctx: &mut ModeCtx<'_>) -> Result<(), SessionError> {
        ctx.display.set_title("Select pickers");
        self.render(ctx);
        Ok(())
    }

    pub(super) fn handle_event(
        &mut self,
        ctx: &mut ModeCtx<'_>,
        event: InputEvent,
    ) -> Result<Transition, SessionError> {
        let InputEvent::Key(key) = event else {
            return Ok(Transition::Stay);
        };
        match key {
            Key::Up | Key::Char('k') => self.cursor = self.cursor.saturating_sub(1),
            Key::Down | Key::Char('j') => {
                self.cursor = (self.cursor + 1).min(self.entries.len().saturating_sub(1));
            }
            Key::Char(' ') => {
                if let Some(entry) = self.entries.get_mut(self.cursor) {
                    entry.selected = !entry.selected;
                }
            }
            Key::Char('+' | '=') => {
                if let Some(entry) = self.entries.get_mut(self.cursor) {
                    entry.weight = (entry.weight + 1).min(MAX_WEIGHT);
                    entry.selected = true;
                }
            }
            Key::Char('-') => {
                if let Some(entry) = self.entries.get_mut(self.cursor) {
                    entry.weight = entry.weight.saturating_sub(1).max(1);
                }
            }
            Key::Enter => {
                let picker = select_pickers(SELECTION_NAME, &self.choices());
                return Ok(Transition::Pop(Some(ModeResult::PickerChosen(picker))));
            }
            Key::Esc => return Ok(Transition::Pop(None)),
            _ => return Ok(Transition::Stay),
        }
        self.render(ctx);
        Ok(Transition::Stay)
    }

    fn render(&self, ctx: &mut ModeCtx<'_>) {
        let mut lines = vec!["space toggle, +/- weight, enter accept, esc cancel".to_string()];
        for (idx, entry) in self.entries.iter().enumerate() {
            let cursor = if idx == self.cursor { '>' } else { ' ' };
            let check = if entry.selected { 'x' } else { ' ' };
            lines.push(format!(
                "{cursor} [{check}] {} x{}",
                entry.picker.name(),
                entry.weight
            ));
        }
        ctx.display.show_message(&lines, Align::Left);
    }
}
