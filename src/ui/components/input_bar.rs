use eframe::egui;

#[derive(Default)]
pub struct InputActions {
    pub send: Option<String>,
    pub typed: bool,
}

/// Composer. Disabled while no connection is open.
pub fn render(ui: &mut egui::Ui, input_text: &mut String, enabled: bool) -> InputActions {
    let mut actions = InputActions::default();
    let mut send = false;

    ui.horizontal(|ui| {
        let response = ui.add_enabled(
            enabled,
            egui::TextEdit::singleline(input_text).hint_text("Type a message..."),
        );
        if response.changed() {
            actions.typed = true;
        }
        if ui.add_enabled(enabled, egui::Button::new("Send")).clicked() {
            send = true;
        }
        if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
            send = true;
            response.request_focus();
        }
    });

    if send && enabled && !input_text.trim().is_empty() {
        actions.send = Some(std::mem::take(input_text));
    }

    actions
}
