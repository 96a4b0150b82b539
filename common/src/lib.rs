pub mod config;
pub mod control;
pub mod fan;
pub mod forecast;
pub mod humidity;
pub mod observation;
pub mod schedule;
pub mod session;
pub mod types;

pub use config::{ControlConfig, FanConfig, HumidityConfig, OccupancyConfig};
pub use control::{plan, ControlPlan};
pub use fan::{FanBand, FanCurve, FanCurveError};
pub use forecast::{default_forecast_window, nearest_forecast, ForecastPoint};
pub use observation::{DeviceSettings, Observation};
pub use schedule::{
    future_target_temp, occupancy, Climate, Program, RemoteSensor, ScheduleError,
    ScheduledEvent,
};
pub use session::{AuthorizationGrant, Session, TokenGrant, TokenState};
pub use types::{
    BacklightMode, BacklightSettings, ControlAction, ControlTargets, FanMode, HumidifierMode,
};
