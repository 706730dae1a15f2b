pub mod app_router;
pub mod emails;
pub mod events;
pub mod feedback;
pub mod notifications;
pub mod review;
pub mod scans;

pub use app_router::AppRouter;
