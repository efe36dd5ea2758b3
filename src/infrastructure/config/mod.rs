mod settings;

pub use settings::{
    DatabaseConfig, DispatchConfig, FcmConfig, JwtConfig, OtelConfig, ReconnectConfig, RedisConfig,
    ServerConfig, Settings, StoreConfig,
};
