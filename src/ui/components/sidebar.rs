use eframe::egui;

use crate::network::Transport;
use crate::session::{ChatSession, NetworkStatus};
use crate::storage::models::avatar_for;
use crate::ui::state::AppState;

#[derive(Default)]
pub struct SidebarActions {
    pub open_chat: Option<String>,
    pub new_chat: bool,
    pub copy_id: bool,
}

pub fn render<T: Transport>(
    ui: &mut egui::Ui,
    session: &ChatSession<T>,
    state: &AppState,
) -> SidebarActions {
    let mut actions = SidebarActions::default();

    ui.horizontal(|ui| {
        ui.heading(avatar_for(session.username()));
        ui.vertical(|ui| {
            ui.strong(session.username());
            let color = match session.network_status() {
                NetworkStatus::Online => egui::Color32::GREEN,
                NetworkStatus::Offline => egui::Color32::GRAY,
                NetworkStatus::Error => egui::Color32::RED,
            };
            ui.colored_label(color, session.network_status().to_string());
        });
    });

    ui.separator();
    ui.label("Your ID:");
    ui.horizontal(|ui| {
        ui.monospace(short_id(session.user_id()));
        if ui.button("Copy").clicked() {
            actions.copy_id = true;
        }
    });
    if let Some(addr) = session.listen_addrs().first() {
        ui.label(egui::RichText::new(addr).small().weak());
    }

    ui.separator();
    ui.horizontal(|ui| {
        ui.heading("Chats");
        if ui.button("New chat").clicked() {
            actions.new_chat = true;
        }
    });

    if state.chats.is_empty() {
        ui.label("No chats yet");
        return actions;
    }

    egui::ScrollArea::vertical().show(ui, |ui| {
        for chat in &state.chats {
            let selected = session.active_chat_id() == Some(chat.id.as_str());
            let preview = chat.last_message.as_deref().unwrap_or("No messages");
            let label = format!("{}  {}\n{}", chat.avatar, chat.title, preview);
            if ui.selectable_label(selected, label).clicked() {
                actions.open_chat = Some(chat.id.clone());
            }
        }
    });

    actions
}

fn short_id(id: &str) -> String {
    if id.chars().count() <= 16 {
        return id.to_string();
    }
    let head: String = id.chars().take(8).collect();
    let tail: String = id.chars().rev().take(6).collect::<Vec<_>>().into_iter().rev().collect();
    format!("{head}…{tail}")
}
