//! Monthly usage limit enforcement.
//!
//! Sits after the access-token middleware on the translation routes. The
//! check reads the counters as they stand; the actual increment happens in
//! the orchestrator once the model has answered. A user without a resolvable
//! plan is denied rather than treated as unlimited.

use axum::body::Body;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use once_cell::sync::Lazy;
use tracing::warn;

use crate::controller::BaseError;
use crate::database::plan::Plan;
use crate::database::user::{User, UserInfo};
use crate::schema::enum_def::UserStatus;
use crate::utils::auth::AuthUser;

/// Where the limit check reads accounts and plans from.
pub trait UsageSource: Sync + Send {
    fn load_user(&self, user_id: i64) -> Result<User, BaseError>;
    fn load_plan(&self, plan_id: i64) -> Result<Plan, BaseError>;
}

struct DbUsageSource;

impl UsageSource for DbUsageSource {
    fn load_user(&self, user_id: i64) -> Result<User, BaseError> {
        User::get_by_id(user_id)
    }

    fn load_plan(&self, plan_id: i64) -> Result<Plan, BaseError> {
        Plan::get_by_id(plan_id)
    }
}

static USAGE_SOURCE: Lazy<Box<dyn UsageSource + Sync + Send>> =
    Lazy::new(|| Box::new(DbUsageSource));

/// Denies suspended accounts and accounts at or over their plan's monthly
/// thresholds. A limit of zero or below means unlimited.
fn check_usage(source: &dyn UsageSource, user_id: i64) -> Result<User, BaseError> {
    let user = source.load_user(user_id)?;
    if user.status == UserStatus::Suspended {
        return Err(BaseError::Forbidden(Some(
            "account is suspended".to_string(),
        )));
    }

    let plan = source.load_plan(user.plan_id).map_err(|e| {
        warn!(user_id = user.id, "plan lookup failed: {}", e);
        BaseError::Forbidden(Some("no active plan".to_string()))
    })?;

    if plan.monthly_request_limit > 0 && user.monthly_requests_count >= plan.monthly_request_limit {
        return Err(BaseError::UsageLimitExceeded(Some(format!(
            "monthly request limit of {} reached",
            plan.monthly_request_limit
        ))));
    }
    if plan.monthly_token_limit > 0 && user.monthly_token_count >= plan.monthly_token_limit {
        return Err(BaseError::UsageLimitExceeded(Some(format!(
            "monthly token limit of {} reached",
            plan.monthly_token_limit
        ))));
    }

    Ok(user)
}

pub async fn usage_limit_middleware(
    mut req: Request,
    next: Next,
) -> Result<Response<Body>, BaseError> {
    let auth = req
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or(BaseError::Unauthorized(None))?;

    let user = check_usage(&**USAGE_SOURCE, auth.id)?;
    req.extensions_mut().insert(UserInfo::from(user));
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeSource {
        user: User,
        plan: Option<Plan>,
    }

    impl UsageSource for FakeSource {
        fn load_user(&self, _: i64) -> Result<User, BaseError> {
            Ok(self.user.clone())
        }

        fn load_plan(&self, plan_id: i64) -> Result<Plan, BaseError> {
            self.plan
                .clone()
                .ok_or(BaseError::NotFound(Some(format!(
                    "Plan with id {} not found",
                    plan_id
                ))))
        }
    }

    fn user_with(requests: i64, tokens: i64, status: UserStatus) -> User {
        User {
            id: 7,
            plan_id: 1,
            status,
            monthly_requests_count: requests,
            monthly_token_count: tokens,
            ..Default::default()
        }
    }

    fn plan_with(request_limit: i64, token_limit: i64) -> Plan {
        Plan {
            id: 1,
            monthly_request_limit: request_limit,
            monthly_token_limit: token_limit,
            ..Default::default()
        }
    }

    #[test]
    fn zero_limits_mean_unlimited() {
        let source = FakeSource {
            user: user_with(1_000_000, 1_000_000, UserStatus::Active),
            plan: Some(plan_with(0, 0)),
        };
        assert!(check_usage(&source, 7).is_ok());
    }

    #[test]
    fn under_both_limits_passes() {
        let source = FakeSource {
            user: user_with(199, 99_999, UserStatus::Active),
            plan: Some(plan_with(200, 100_000)),
        };
        assert!(check_usage(&source, 7).is_ok());
    }

    #[test]
    fn at_request_limit_is_denied() {
        let source = FakeSource {
            user: user_with(200, 0, UserStatus::Active),
            plan: Some(plan_with(200, 100_000)),
        };
        assert!(matches!(
            check_usage(&source, 7),
            Err(BaseError::UsageLimitExceeded(_))
        ));
    }

    #[test]
    fn at_token_limit_is_denied() {
        let source = FakeSource {
            user: user_with(0, 100_000, UserStatus::Active),
            plan: Some(plan_with(200, 100_000)),
        };
        assert!(matches!(
            check_usage(&source, 7),
            Err(BaseError::UsageLimitExceeded(_))
        ));
    }

    #[test]
    fn suspended_account_is_forbidden_before_plan_lookup() {
        let source = FakeSource {
            user: user_with(0, 0, UserStatus::Suspended),
            plan: Some(plan_with(0, 0)),
        };
        assert!(matches!(
            check_usage(&source, 7),
            Err(BaseError::Forbidden(_))
        ));
    }

    #[test]
    fn missing_plan_is_forbidden_not_unlimited() {
        let source = FakeSource {
            user: user_with(0, 0, UserStatus::Active),
            plan: None,
        };
        assert!(matches!(
            check_usage(&source, 7),
            Err(BaseError::Forbidden(_))
        ));
    }
}
