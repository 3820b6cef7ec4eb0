use auditoria_core::Publisher;

#[derive(Debug, Clone)]
pub struct AppState {
    pub publisher: Publisher,
}

impl AppState {
    pub fn new(publisher: Publisher) -> Self {
        Self { publisher }
    }
}
