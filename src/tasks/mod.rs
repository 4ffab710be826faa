pub mod discipline_task;
pub mod gps_task;
pub mod pulse_task;
pub mod status_task;
pub mod tick_task;
