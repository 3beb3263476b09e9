use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{AttendanceFilter, AttendancePage, AttendanceStore, StoreError, Versioned};
use crate::model::attendance::Attendance;
use crate::model::schedule::Scheduler;

/// Process-local store backing the tests. Every operation holds the lock for its whole
/// read-check-write, which makes attendance writes atomic.
#[derive(Default)]
pub struct MemoryStore {
    schedulers: Mutex<HashMap<String, Scheduler>>,
    attendance: Mutex<HashMap<String, Versioned<Attendance>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn filter_accepts(filter: &AttendanceFilter, record: &Attendance) -> bool {
    filter.user_id.is_none_or(|id| record.user.id == id)
        && filter
            .schedule_id
            .as_deref()
            .is_none_or(|id| record.schedule.id == id)
        && filter.from.is_none_or(|from| record.date() >= from)
        && filter.to.is_none_or(|to| record.date() <= to)
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn get_scheduler(&self, id: &str) -> Result<Option<Scheduler>, StoreError> {
        Ok(self
            .schedulers
            .lock()
            .expect("scheduler map poisoned")
            .get(id)
            .cloned())
    }

    async fn list_schedulers(&self, agency_id: Option<u64>) -> Result<Vec<Scheduler>, StoreError> {
        let mut list: Vec<Scheduler> = self
            .schedulers
            .lock()
            .expect("scheduler map poisoned")
            .values()
            .filter(|s| agency_id.is_none_or(|id| s.owner_agency_id == id))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(list)
    }

    async fn put_scheduler(&self, scheduler: &Scheduler) -> Result<(), StoreError> {
        self.schedulers
            .lock()
            .expect("scheduler map poisoned")
            .insert(scheduler.id.clone(), scheduler.clone());
        Ok(())
    }

    async fn get_attendance(&self, id: &str) -> Result<Option<Versioned<Attendance>>, StoreError> {
        Ok(self
            .attendance
            .lock()
            .expect("attendance map poisoned")
            .get(id)
            .cloned())
    }

    async fn find_attendance(
        &self,
        user_id: u64,
        date: NaiveDate,
    ) -> Result<Option<Versioned<Attendance>>, StoreError> {
        Ok(self
            .attendance
            .lock()
            .expect("attendance map poisoned")
            .values()
            .find(|v| v.doc.user.id == user_id && v.doc.date() == date)
            .cloned())
    }

    async fn query_attendance(&self, filter: &AttendanceFilter) -> Result<AttendancePage, StoreError> {
        let mut data: Vec<Attendance> = self
            .attendance
            .lock()
            .expect("attendance map poisoned")
            .values()
            .filter(|v| filter_accepts(filter, &v.doc))
            .map(|v| v.doc.clone())
            .collect();
        data.sort_by(|a, b| {
            a.date()
                .cmp(&b.date())
                .then_with(|| a.user.id.cmp(&b.user.id))
        });

        let total = data.len() as i64;
        if let Some((limit, offset)) = filter.window() {
            data = data
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect();
        }

        Ok(AttendancePage { data, total })
    }

    async fn put_attendance(
        &self,
        record: &Attendance,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        let mut map = self.attendance.lock().expect("attendance map poisoned");

        let version = match expected_version {
            None => {
                let taken = map.contains_key(&record.id)
                    || map
                        .values()
                        .any(|v| v.doc.user.id == record.user.id && v.doc.date() == record.date());
                if taken {
                    return Err(StoreError::Conflict(record.id.clone()));
                }
                1
            }
            Some(expected) => match map.get(&record.id) {
                Some(current) if current.version == expected => expected + 1,
                _ => return Err(StoreError::Conflict(record.id.clone())),
            },
        };

        map.insert(
            record.id.clone(),
            Versioned {
                version,
                doc: record.clone(),
            },
        );
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attendance::UserRef;
    use crate::model::schedule::fixtures::*;

    fn record(user_id: u64, day: u32) -> Attendance {
        let sched = scheduler(date(2026, 1, 1), date(2026, 1, 31), office_week());
        Attendance::placeholder(
            &sched,
            UserRef {
                id: user_id,
                name: format!("user-{user_id}"),
            },
            date(2026, 1, day),
            date(2026, 1, day).and_time(time(7, 0)),
        )
    }

    #[actix_web::test]
    async fn insert_then_compare_and_swap() {
        let store = MemoryStore::new();
        let mut doc = record(1, 5);

        assert_eq!(store.put_attendance(&doc, None).await.unwrap(), 1);
        doc.total_work_minutes = 30;
        assert_eq!(store.put_attendance(&doc, Some(1)).await.unwrap(), 2);

        // stale writer
        assert!(matches!(
            store.put_attendance(&doc, Some(1)).await,
            Err(StoreError::Conflict(_))
        ));

        let stored = store.get_attendance(&doc.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.doc.total_work_minutes, 30);
    }

    #[actix_web::test]
    async fn second_insert_for_same_user_and_day_conflicts() {
        let store = MemoryStore::new();
        store.put_attendance(&record(1, 5), None).await.unwrap();

        // different id, same (user, date)
        assert!(matches!(
            store.put_attendance(&record(1, 5), None).await,
            Err(StoreError::Conflict(_))
        ));
        // another user on the same day is fine
        assert!(store.put_attendance(&record(2, 5), None).await.is_ok());
    }

    #[actix_web::test]
    async fn query_filters_orders_and_paginates() {
        let store = MemoryStore::new();
        for day in [7, 5, 6, 9] {
            store.put_attendance(&record(1, day), None).await.unwrap();
        }
        store.put_attendance(&record(2, 6), None).await.unwrap();

        let mut filter = AttendanceFilter::for_user(1, Some(date(2026, 1, 6)), None);
        let page = store.query_attendance(&filter).await.unwrap();
        let days: Vec<_> = page.data.iter().map(|r| r.date()).collect();
        assert_eq!(
            days,
            vec![date(2026, 1, 6), date(2026, 1, 7), date(2026, 1, 9)]
        );
        assert_eq!(page.total, 3);

        filter.page = Some(2);
        filter.per_page = Some(2);
        let page = store.query_attendance(&filter).await.unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.total, 3);
    }

    #[actix_web::test]
    async fn schedulers_filter_by_agency() {
        let store = MemoryStore::new();
        let mut a = scheduler(date(2026, 1, 1), date(2026, 1, 31), office_week());
        a.id = "a".to_string();
        let mut b = a.clone();
        b.id = "b".to_string();
        b.owner_agency_id = 99;
        store.put_scheduler(&a).await.unwrap();
        store.put_scheduler(&b).await.unwrap();

        assert_eq!(store.list_schedulers(None).await.unwrap().len(), 2);
        let mine = store.list_schedulers(Some(99)).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, "b");
        assert_eq!(store.get_scheduler("a").await.unwrap(), Some(a));
    }
}
