use chrono::{Local, TimeZone};
use eframe::egui;

use crate::storage::{Chat, Message};

pub fn render_header(ui: &mut egui::Ui, chat: &Chat, status: &str) {
    ui.horizontal(|ui| {
        ui.heading(&chat.avatar);
        ui.vertical(|ui| {
            ui.strong(&chat.title);
            if !status.is_empty() {
                ui.label(egui::RichText::new(status).weak());
            }
        });
    });
}

pub fn render_placeholder(ui: &mut egui::Ui) -> bool {
    let mut start = false;
    ui.vertical_centered(|ui| {
        ui.add_space(80.0);
        ui.heading("Select a chat or start a new one");
        if ui.button("Start chat").clicked() {
            start = true;
        }
    });
    start
}

/// Outgoing messages are the ones whose sender is our own name.
pub fn render_messages(ui: &mut egui::Ui, messages: &[Message], username: &str) {
    egui::ScrollArea::vertical()
        .auto_shrink([false, false])
        .stick_to_bottom(true)
        .max_height(ui.available_height() - 40.0)
        .show(ui, |ui| {
            for message in messages {
                let time = format_time(message.timestamp);
                if message.is_system {
                    ui.vertical_centered(|ui| {
                        ui.label(egui::RichText::new(&message.content).italics().weak());
                    });
                } else if message.sender == username {
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::TOP), |ui| {
                        ui.label(egui::RichText::new(time).small().weak());
                        ui.colored_label(egui::Color32::LIGHT_BLUE, &message.content);
                    });
                } else {
                    ui.horizontal(|ui| {
                        ui.strong(format!("{}:", message.sender));
                        ui.label(&message.content);
                        ui.label(egui::RichText::new(time).small().weak());
                    });
                }
            }
        });
}

fn format_time(timestamp: i64) -> String {
    Local
        .timestamp_millis_opt(timestamp)
        .single()
        .map(|time| time.format("%H:%M").to_string())
        .unwrap_or_default()
}
