pub const GATEWAY_HEALTH_MESSAGE: &str = "Gateway Producer Operativo";

pub async fn liveness() -> &'static str {
    "OK"
}

/// Reports the process as up. Does not check the bus.
pub async fn gateway_health() -> &'static str {
    GATEWAY_HEALTH_MESSAGE
}
