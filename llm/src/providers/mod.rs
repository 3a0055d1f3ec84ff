pub(crate) mod deepseek;

pub use deepseek::{DeepSeekChatModel, DeepSeekProvider};
