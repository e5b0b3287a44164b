pub mod assessment;
pub mod auth;
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
pub mod response;
pub mod service_provision_log;
pub mod service_user;
pub mod session_record;
pub mod signature;
pub mod support_plan;

pub use response::*;

use chrono::NaiveDate;
use rocket::form::{self, FromFormField, ValueField};
use rocket::http::Status;
use rocket::{Request, Route};

use crate::config::AppConfig;
use crate::db::query::{ListRequest, PageRequest, SortSpec};

/// Query parameters understood by every list endpoint.
#[derive(FromForm, Debug, Default)]
pub struct ListParams {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    #[field(name = "sortBy")]
    pub sort_by: Option<String>,
    #[field(name = "sortDirection")]
    pub sort_direction: Option<String>,
    pub search: Option<String>,
    pub keyword: Option<String>,
}

impl ListParams {
    pub fn resolve(
        &self,
        config: &AppConfig,
        sortable: &[(&str, &'static str)],
        default_sort: &'static str,
    ) -> ListRequest {
        ListRequest {
            page: PageRequest::new(self.page, self.per_page, config.per_page),
            sort: SortSpec::resolve(
                self.sort_by.as_deref(),
                self.sort_direction.as_deref(),
                sortable,
                default_sort,
            ),
            search: self.search.clone().or_else(|| self.keyword.clone()),
        }
    }
}

/// `YYYY-MM-DD` query value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryDate(pub NaiveDate);

#[rocket::async_trait]
impl<'v> FromFormField<'v> for QueryDate {
    fn from_value(field: ValueField<'v>) -> form::Result<'v, Self> {
        NaiveDate::parse_from_str(field.value, "%Y-%m-%d")
            .map(QueryDate)
            .map_err(|_| form::Error::validation("日付はYYYY-MM-DD形式で入力してください。").into())
    }
}

pub fn date_opt(value: Option<QueryDate>) -> Option<NaiveDate> {
    value.map(|d| d.0)
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

#[catch(default)]
pub fn default_api(status: Status, _req: &Request) -> ApiResponse<()> {
    let message = match status.code {
        400 => "リクエストの形式が正しくありません。",
        403 => "この操作を行う権限がありません。",
        404 => "リソースが見つかりません。",
        413 => "アップロードできるサイズを超えています。",
        422 => "リクエストの内容を処理できません。",
        500 => "サーバーエラーが発生しました。",
        _ => "エラーが発生しました。",
    };
    ApiResponse::error(status, message)
}

pub fn routes() -> Vec<Route> {
    let mut routes = routes![health];
    routes.extend(auth::routes());
    routes.extend(profile::routes());
    routes.extend(manager::routes());
    routes.extend(facility::routes());
    routes.extend(consultation::routes());
    routes.extend(family_member::routes());
    routes.extend(service_user::routes());
    routes.extend(information_consent::routes());
    routes.extend(deposit::routes());
    routes.extend(document::routes());
    routes.extend(daily_report::routes());
    routes.extend(incident::routes());
    routes.extend(assessment::routes());
    routes.extend(support_plan::routes());
    routes.extend(session_record::routes());
    routes.extend(service_provision_log::routes());
    routes.extend(signature::routes());
    routes.extend(media::routes());
    routes
}
