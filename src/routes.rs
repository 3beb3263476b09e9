use crate::{
    api::{attendance, schedule},
    auth::middleware::auth_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond((60_000 / requests_per_min as u64).max(1))
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        // both values are clamped to >= 1 above, the only case finish() rejects
        .unwrap_or_else(|| unreachable!("governor quota must be non-zero"));
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let clock_limiter = Arc::new(build_limiter(config.rate_clock_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Everything is protected; tokens are issued elsewhere
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::scope("/schedules")
                    // /schedules
                    .service(
                        web::resource("")
                            .route(web::post().to(schedule::create_schedule))
                            .route(web::get().to(schedule::list_schedules)),
                    )
                    // /schedules/{id}
                    .service(web::resource("/{id}").route(web::get().to(schedule::get_schedule)))
                    // /schedules/{id}/summary
                    .service(
                        web::resource("/{id}/summary")
                            .route(web::get().to(schedule::schedule_summary)),
                    ),
            )
            .service(
                web::scope("/attendance")
                    // /attendance
                    .service(web::resource("").route(web::get().to(attendance::list_attendance)))
                    // /attendance/clock
                    .service(
                        web::resource("/clock")
                            .wrap(clock_limiter)
                            .route(web::post().to(attendance::clock)),
                    )
                    // /attendance/today
                    .service(web::resource("/today").route(web::get().to(attendance::today)))
                    // /attendance/excuse
                    .service(
                        web::resource("/excuse").route(web::put().to(attendance::excuse_day)),
                    )
                    // /attendance/summary
                    .service(
                        web::resource("/summary")
                            .route(web::get().to(attendance::attendance_summary)),
                    )
                    // /attendance/{id}
                    .service(
                        web::resource("/{id}").route(web::get().to(attendance::get_attendance)),
                    )
                    // /attendance/{id}/sessions/{index}/excuse
                    .service(
                        web::resource("/{id}/sessions/{index}/excuse")
                            .route(web::put().to(attendance::excuse_session)),
                    ),
            ),
    );
}

// CLOCK REQUEST
//  └─ Authorization: Bearer access_token (role = student)
//       └─ server time = local now + synced offset
//            └─ toggle next session, CAS write on (user, date)
