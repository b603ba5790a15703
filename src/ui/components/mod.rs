pub mod chat_area;
pub mod input_bar;
pub mod modals;
pub mod sidebar;
