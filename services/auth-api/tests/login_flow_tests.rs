//! Login flow tests over an in-memory users directory.
//!
//! Breaker timing runs on paused tokio time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use auth_api::{
    AuthApiError, AuthApiMetrics, RequestContext, User, UserDirectory, UserResolutionService,
};
use auth_api::observability::breaker_state_observer;
use prometheus::Registry;
use proptest::prelude::*;
use rust_common::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use tokio::task::JoinSet;

/// Directory that answers from memory and counts every call.
#[derive(Default)]
struct FakeDirectory {
    calls: AtomicUsize,
    failing: AtomicBool,
    delay_ms: AtomicU64,
}

impl FakeDirectory {
    fn healthy() -> Self {
        Self::default()
    }

    fn failing() -> Self {
        let directory = Self::default();
        directory.set_failing(true);
        directory
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn set_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap();
        self.delay_ms.store(millis, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl UserDirectory for FakeDirectory {
    async fn fetch(&self, ctx: &RequestContext, username: &str) -> Result<User, AuthApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = Duration::from_millis(self.delay_ms.load(Ordering::SeqCst));
        let failing = self.failing.load(Ordering::SeqCst);

        ctx.run(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if failing {
                return Err(AuthApiError::UpstreamRejected {
                    status: 503,
                    body: "users api unavailable".to_string(),
                });
            }
            let role = if username == "admin" { "admin" } else { "user" };
            Ok(User::new(username, "Remote", "Profile", role))
        })
        .await
    }
}

fn service(directory: FakeDirectory) -> UserResolutionService<FakeDirectory> {
    UserResolutionService::new(
        directory,
        CircuitBreaker::new(CircuitBreakerConfig::new("users-api")),
    )
}

async fn trip(service: &UserResolutionService<FakeDirectory>) {
    let ctx = RequestContext::background();
    for _ in 0..5 {
        let err = service.resolve_user(&ctx, "johnd").await.unwrap_err();
        assert!(matches!(err, AuthApiError::UpstreamRejected { status: 503, .. }));
    }
    assert_eq!(service.breaker().state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_admin_login_with_healthy_upstream() {
    let service = service(FakeDirectory::healthy());

    let user = service
        .login(&RequestContext::background(), "admin", "admin")
        .await
        .unwrap();

    assert_eq!(user, User::new("admin", "Remote", "Profile", "admin"));
    assert_eq!(service.directory().calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_wrong_secret_returns_no_profile() {
    let service = service(FakeDirectory::healthy());

    let err = service
        .login(&RequestContext::background(), "admin", "wrong")
        .await
        .unwrap_err();

    match err {
        AuthApiError::WrongCredentials { username } => assert_eq!(username, "admin"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_open_circuit_serves_fallback_admin() {
    let service = service(FakeDirectory::failing());
    trip(&service).await;

    let user = service
        .login(&RequestContext::background(), "admin", "admin")
        .await
        .unwrap();

    assert_eq!(user, User::new("admin", "Admin", "User", "admin"));
}

#[tokio::test(start_paused = true)]
async fn test_sixth_call_skips_upstream() {
    let service = service(FakeDirectory::failing());
    trip(&service).await;
    assert_eq!(service.directory().calls(), 5);

    let user = service
        .resolve_user(&RequestContext::background(), "johnd")
        .await
        .unwrap();

    assert_eq!(user, User::new("johnd", "John", "Doe", "user"));
    assert_eq!(service.directory().calls(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_user_while_open() {
    let service = service(FakeDirectory::failing());
    trip(&service).await;
    let ctx = RequestContext::background();

    let user = service.resolve_user(&ctx, "mallory").await.unwrap();
    assert_eq!(user, User::placeholder("mallory"));

    let err = service.login(&ctx, "mallory", "admin").await.unwrap_err();
    assert!(matches!(err, AuthApiError::WrongCredentials { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_half_open_recovery_closes_circuit() {
    let service = service(FakeDirectory::failing());
    trip(&service).await;

    tokio::time::advance(Duration::from_secs(10)).await;
    service.directory().set_failing(false);
    let ctx = RequestContext::background();

    for _ in 0..3 {
        let user = service.resolve_user(&ctx, "janed").await.unwrap();
        assert_eq!(user.first_name, "Remote");
    }

    assert_eq!(service.breaker().state(), CircuitState::Closed);
    assert_eq!(service.directory().calls(), 8);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_failure_reopens() {
    let service = service(FakeDirectory::failing());
    trip(&service).await;

    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(service.breaker().state(), CircuitState::HalfOpen);

    let ctx = RequestContext::background();
    let err = service.resolve_user(&ctx, "janed").await.unwrap_err();
    assert!(matches!(err, AuthApiError::UpstreamRejected { .. }));
    assert_eq!(service.breaker().state(), CircuitState::Open);

    let user = service.resolve_user(&ctx, "janed").await.unwrap();
    assert_eq!(user, User::new("janed", "Jane", "Doe", "user"));
    assert_eq!(service.directory().calls(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_counts_as_failure() {
    let directory = FakeDirectory::healthy();
    directory.set_delay(Duration::from_secs(60));
    let service = service(directory);
    let (ctx, handle) = RequestContext::background().cancellable();

    let canceller = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel();
    };
    let (result, ()) = tokio::join!(service.login(&ctx, "johnd", "foo"), canceller);

    assert!(matches!(result, Err(AuthApiError::Cancelled)));
    assert_eq!(service.breaker().counts().consecutive_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_deadlines_trip_the_breaker() {
    let directory = FakeDirectory::healthy();
    directory.set_delay(Duration::from_secs(60));
    let service = service(directory);

    for _ in 0..5 {
        let ctx = RequestContext::background().with_timeout(Duration::from_secs(1));
        let err = service.resolve_user(&ctx, "johnd").await.unwrap_err();
        assert!(matches!(err, AuthApiError::Timeout { .. }));
    }

    assert_eq!(service.breaker().state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_login_counts_as_failure() {
    let directory = FakeDirectory::healthy();
    directory.set_delay(Duration::from_secs(60));
    let service = service(directory);
    let ctx = RequestContext::background();

    let abandoned =
        tokio::time::timeout(Duration::from_secs(1), service.login(&ctx, "johnd", "foo")).await;

    assert!(abandoned.is_err());
    assert_eq!(service.breaker().counts().consecutive_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_admits_quota_and_falls_back_for_the_rest() {
    let service = Arc::new(service(FakeDirectory::failing()));
    trip(&service).await;

    tokio::time::advance(Duration::from_secs(10)).await;
    service.directory().set_failing(false);
    service.directory().set_delay(Duration::from_secs(1));

    let mut tasks = JoinSet::new();
    for _ in 0..10 {
        let service = Arc::clone(&service);
        tasks.spawn(async move {
            service
                .resolve_user(&RequestContext::background(), "johnd")
                .await
        });
    }

    let mut upstream = 0;
    let mut fallback = 0;
    while let Some(joined) = tasks.join_next().await {
        let user = joined.unwrap().unwrap();
        if user.first_name == "Remote" {
            upstream += 1;
        } else {
            assert_eq!(user, User::new("johnd", "John", "Doe", "user"));
            fallback += 1;
        }
    }

    assert_eq!(upstream, 3);
    assert_eq!(fallback, 7);
    assert_eq!(service.directory().calls(), 8);
    assert_eq!(service.breaker().state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_metrics_track_breaker_fallback_and_logins() {
    let metrics = AuthApiMetrics::new(&Registry::new()).unwrap();
    let breaker = CircuitBreaker::new(
        CircuitBreakerConfig::new("users-api")
            .with_state_change_observer(breaker_state_observer(metrics.clone())),
    );
    let service = UserResolutionService::new(FakeDirectory::failing(), breaker)
        .with_metrics(metrics.clone());
    let ctx = RequestContext::background();

    for _ in 0..5 {
        assert!(service.login(&ctx, "admin", "admin").await.is_err());
    }
    service.login(&ctx, "admin", "admin").await.unwrap();
    assert!(service.login(&ctx, "admin", "nope").await.is_err());

    assert_eq!(metrics.fallbacks.get(), 2);
    let opened = metrics
        .state_changes
        .with_label_values(&["users-api", "closed", "open"])
        .get();
    assert!((opened - 1.0).abs() < f64::EPSILON);
    let errors = metrics.logins.with_label_values(&["error"]).get();
    assert!((errors - 5.0).abs() < f64::EPSILON);
    let successes = metrics.logins.with_label_values(&["success"]).get();
    assert!((successes - 1.0).abs() < f64::EPSILON);
    let wrong = metrics.logins.with_label_values(&["wrong_credentials"]).get();
    assert!((wrong - 1.0).abs() < f64::EPSILON);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Unknown usernames never log in, whether the profile comes from the
    /// users API or from fallback data.
    #[test]
    fn prop_unknown_users_never_log_in(
        username in "[a-z]{1,10}",
        secret in "[a-z]{0,10}",
        circuit_open in any::<bool>(),
    ) {
        prop_assume!(!matches!(username.as_str(), "admin" | "johnd" | "janed"));

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        let result = rt.block_on(async {
            let service = if circuit_open {
                let service = service(FakeDirectory::failing());
                trip(&service).await;
                service
            } else {
                service(FakeDirectory::healthy())
            };
            service
                .login(&RequestContext::background(), &username, &secret)
                .await
        });

        prop_assert!(
            matches!(&result, Err(AuthApiError::WrongCredentials { username: u }) if *u == username),
            "unexpected result: {:?}",
            result
        );
    }
}
