use std::time::Duration;

use eframe::egui;
use tokio::sync::mpsc;

use crate::common::NetworkEvent;
use crate::error::Result;
use crate::network::Transport;
use crate::session::ChatSession;

use super::components::{
    chat_area, input_bar, modals,
    sidebar::{self, SidebarActions},
};
use super::state::AppState;

pub struct ChatApp<T: Transport> {
    session: ChatSession<T>,
    event_receiver: mpsc::Receiver<NetworkEvent>,
    state: AppState,
}

impl<T: Transport> ChatApp<T> {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        session: ChatSession<T>,
        event_receiver: mpsc::Receiver<NetworkEvent>,
    ) -> Self {
        Self {
            session,
            event_receiver,
            state: AppState::new(),
        }
    }

    fn handle_network_events(&mut self) {
        while let Ok(event) = self.event_receiver.try_recv() {
            let result = self.session.handle_event(event);
            self.check(result);
        }
    }

    /// Route a failed action to the session's notice.
    fn check<R>(&mut self, result: Result<R>) {
        if let Err(err) = result {
            self.session.report(err);
        }
    }

    fn refresh(&mut self) {
        let result = self.state.refresh(&self.session);
        self.check(result);
        if let Some(notice) = self.session.take_notice() {
            self.state.notice = Some(notice);
        }
    }

    fn apply_sidebar(&mut self, ctx: &egui::Context, actions: SidebarActions) {
        if actions.copy_id {
            ctx.copy_text(self.session.user_id().to_string());
            self.state.notice = Some("ID copied to clipboard!".to_string());
        }
        if actions.new_chat {
            self.state.show_connect_modal = true;
        }
        if let Some(chat_id) = actions.open_chat {
            let result = self.session.open_chat(&chat_id);
            self.check(result);
        }
    }

    fn show_modals(&mut self, ctx: &egui::Context) {
        if self.session.needs_username() {
            if let Some(name) = modals::username_prompt(ctx, &mut self.state.username_input) {
                let result = self.session.save_username(&name);
                self.check(result);
            }
        } else if self.state.show_connect_modal {
            let actions = modals::connect_prompt(ctx, &mut self.state.friend_input);
            if let Some(target) = actions.connect {
                match self.session.connect_to_friend(&target) {
                    Ok(()) => self.state.close_connect_modal(),
                    Err(err) => self.session.report(err),
                }
            } else if actions.create_new {
                self.state.close_connect_modal();
                let result = self.session.create_new_chat();
                self.check(result);
            } else if actions.cancel {
                self.state.close_connect_modal();
            }
        }

        if let Some(text) = self.state.notice.clone() {
            if modals::notice(ctx, &text) {
                self.state.notice = None;
            }
        }
    }
}

impl<T: Transport> eframe::App for ChatApp<T> {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_network_events();
        self.refresh();

        egui::SidePanel::left("chat_sidebar")
            .resizable(true)
            .default_width(260.0)
            .show(ctx, |ui| {
                let actions = sidebar::render(ui, &self.session, &self.state);
                self.apply_sidebar(ctx, actions);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            let Some(chat) = self.state.active_chat.clone() else {
                if chat_area::render_placeholder(ui) {
                    self.state.show_connect_modal = true;
                }
                return;
            };

            chat_area::render_header(ui, &chat, self.session.chat_status());
            ui.separator();
            chat_area::render_messages(ui, &self.state.messages, self.session.username());
            ui.separator();

            let actions =
                input_bar::render(ui, &mut self.state.input_text, self.session.can_compose());
            if actions.typed {
                self.session.notify_typing();
            }
            if let Some(content) = actions.send {
                let result = self.session.send_message(&content);
                self.check(result);
            }
        });

        self.show_modals(ctx);
        self.refresh();

        ctx.request_repaint_after(Duration::from_millis(100));
    }
}
