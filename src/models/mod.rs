pub mod assessment;
pub mod consultation;
pub mod daily_report;
pub mod deposit;
pub mod document;
pub mod facility;
pub mod family_member;
pub mod incident;
pub mod information_consent;
pub mod manager;
pub mod media;
pub mod profile;
pub mod service_provision_log;
pub mod service_user;
pub mod session_record;
pub mod signature;
pub mod support_plan;
