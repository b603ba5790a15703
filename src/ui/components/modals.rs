use eframe::egui;

/// Name prompt. Cannot be dismissed; returns the entered name on save.
pub fn username_prompt(ctx: &egui::Context, input: &mut String) -> Option<String> {
    let mut submitted = None;
    egui::Modal::new(egui::Id::new("username_modal")).show(ctx, |ui| {
        ui.heading("What's your name?");
        let response = ui.text_edit_singleline(input);
        let enter = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
        if ui.button("Save").clicked() || enter {
            submitted = Some(input.trim().to_string());
        }
    });
    submitted
}

#[derive(Default)]
pub struct ConnectActions {
    pub connect: Option<String>,
    pub create_new: bool,
    pub cancel: bool,
}

pub fn connect_prompt(ctx: &egui::Context, friend_input: &mut String) -> ConnectActions {
    let mut actions = ConnectActions::default();
    let modal = egui::Modal::new(egui::Id::new("connect_modal")).show(ctx, |ui| {
        ui.heading("New chat");
        ui.label("Friend's ID or address:");
        ui.text_edit_singleline(friend_input);
        ui.horizontal(|ui| {
            if ui.button("Connect").clicked() {
                actions.connect = Some(friend_input.trim().to_string());
            }
            if ui.button("Create new chat").clicked() {
                actions.create_new = true;
            }
            if ui.button("Cancel").clicked() {
                actions.cancel = true;
            }
        });
    });
    if modal.should_close() {
        actions.cancel = true;
    }
    actions
}

/// Blocking notice. Returns true once acknowledged.
pub fn notice(ctx: &egui::Context, text: &str) -> bool {
    let mut dismissed = false;
    egui::Modal::new(egui::Id::new("notice_modal")).show(ctx, |ui| {
        ui.label(text);
        if ui.button("OK").clicked() {
            dismissed = true;
        }
    });
    dismissed
}
