use pedal_bus::{DisplayState, KeyActionEvent, Presenter};

/// Draws the indicator as a single status line on stdout.
#[derive(Debug, Default)]
pub struct TerminalPresenter {
    display: DisplayState,
}

impl TerminalPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn display(&self) -> &DisplayState {
        &self.display
    }

    /// `left: media-record-symbolic (pressed) | right: ...`
    pub fn render(&self) -> String {
        if self.display.is_empty() {
            return "(no keys)".to_string();
        }
        self.display.iter().map(|(key, display)| format!("{}: {} ({})", key, display.icon, display.state)).collect::<Vec<_>>().join(" | ")
    }
}

impl Presenter for TerminalPresenter {
    fn on_connected(&mut self) {
        log::info!("Indicator is on the bus");
    }

    /// The reason itself is logged through [`Presenter::on_error`].
    fn on_name_lost(&mut self, _reason: &str) {
        self.display.clear();
    }

    fn on_event(&mut self, event: &KeyActionEvent) {
        self.display.apply(event);
        println!("{}", self.render());
    }

    fn on_error(&mut self, err: &pedal_bus::Error) {
        log::error!("{}", err);
    }
}
