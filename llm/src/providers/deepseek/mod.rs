mod chat;
mod provider;

pub use chat::DeepSeekChatModel;
pub use provider::DeepSeekProvider;
