//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod admin_user_repo;
pub mod automation_repo;
pub mod delivery_repo;
pub mod enrollment_repo;
pub mod newsletter_repo;
pub mod send_job_repo;
pub mod session_repo;
pub mod subscriber_repo;
pub mod tracking_repo;

pub use admin_user_repo::AdminUserRepo;
pub use automation_repo::AutomationRepo;
pub use delivery_repo::DeliveryRepo;
pub use enrollment_repo::EnrollmentRepo;
pub use newsletter_repo::NewsletterRepo;
pub use send_job_repo::SendJobRepo;
pub use session_repo::SessionRepo;
pub use subscriber_repo::SubscriberRepo;
pub use tracking_repo::TrackingRepo;
