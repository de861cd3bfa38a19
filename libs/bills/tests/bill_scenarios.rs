//! End-to-end behaviour of the repository and statistics aggregator,
//! exercised against the in-memory store.

use std::sync::Arc;

use anyhow::Result;
use bills::models::{BillInput, BillPatch, BillStatus, Category, ListParams, MonthlyExpense, User};
use bills::store::{BillStore, LocalStore};
use bills::{BillError, BillRepository, StatsAggregator};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

struct Fixture {
    store: Arc<LocalStore>,
    repository: BillRepository,
    stats: StatsAggregator,
}

impl Fixture {
    fn new() -> Self {
        let store = Arc::new(LocalStore::new());
        Self {
            repository: BillRepository::new(store.clone(), store.clone()),
            stats: StatsAggregator::new(store.clone()),
            store,
        }
    }

    async fn user(&self, name: &str) -> Result<Uuid> {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            avatar: None,
            created_at: now,
            updated_at: now,
        };
        let id = user.id;
        self.store.insert_user(user).await?;
        Ok(id)
    }
}

fn input(value: serde_json::Value) -> BillInput {
    serde_json::from_value(value).expect("bill input")
}

fn bill_input(title: &str, amount: &str, users: &[Uuid], status: &str) -> BillInput {
    input(json!({
        "title": title,
        "amount": amount,
        "dueDate": "2030-01-31",
        "status": status,
        "users": users.iter().map(Uuid::to_string).collect::<Vec<_>>(),
    }))
}

fn patch(value: serde_json::Value) -> BillPatch {
    serde_json::from_value(value).expect("bill patch")
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[tokio::test]
async fn test_scenario_totals_and_split() -> Result<()> {
    let fx = Fixture::new();
    let u1 = fx.user("Ana").await?;
    let u2 = fx.user("Ben").await?;
    let u3 = fx.user("Cleo").await?;

    let a = fx
        .repository
        .create(&bill_input("Electricity", "90.00", &[u1, u2, u3], "pending"), u1)
        .await?;
    let b = fx
        .repository
        .create(&bill_input("Water", "60.00", &[u1], "paid"), u1)
        .await?;

    assert_eq!(a.amount_per_person, dec!(30));
    assert_eq!(a.users.len(), 3);
    assert_eq!(a.created_by.as_ref().map(|u| u.id), Some(u1));

    let stats = fx.stats.summarize(u1, today()).await?;
    assert_eq!(stats.total_bills, 2);
    assert_eq!(stats.unpaid_bills, 1);
    assert_eq!(stats.total_amount, dec!(150.00));
    assert_eq!(stats.unpaid_amount, dec!(90.00));

    let paid = fx
        .repository
        .list(
            &ListParams {
                status: Some("paid".to_string()),
                ..Default::default()
            },
            u1,
        )
        .await?;
    assert_eq!(paid.total, 1);
    assert_eq!(paid.items.len(), 1);
    assert_eq!(paid.items[0].id, b.id);

    // u2 only participates in A
    let stats = fx.stats.summarize(u2, today()).await?;
    assert_eq!(stats.total_bills, 1);
    assert_eq!(stats.total_amount, dec!(90.00));
    Ok(())
}

#[tokio::test]
async fn test_empty_summary() -> Result<()> {
    let fx = Fixture::new();
    let loner = fx.user("Solo").await?;

    let stats = fx.stats.summarize(loner, today()).await?;
    assert_eq!(stats.total_bills, 0);
    assert_eq!(stats.unpaid_bills, 0);
    assert_eq!(stats.total_amount, Decimal::ZERO);
    assert_eq!(stats.unpaid_amount, Decimal::ZERO);
    assert!(stats.monthly_expenses.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_monthly_series_window_and_order() -> Result<()> {
    let fx = Fixture::new();
    let owner = fx.user("Ana").await?;
    let today = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();

    for (amount, date) in [
        ("10.00", "2025-06-01"),
        ("15.00", "2025-01-20"),
        ("5.00", "2025-06-10"),
        ("99.00", "2024-12-14"),
    ] {
        let mut raw = json!({
            "title": "Gas",
            "amount": amount,
            "date": date,
            "dueDate": date,
            "users": [owner.to_string()],
        });
        raw["category"] = json!("gas");
        fx.repository.create(&input(raw), owner).await?;
    }

    let stats = fx.stats.summarize(owner, today).await?;
    assert_eq!(stats.total_bills, 4);
    assert_eq!(
        stats.monthly_expenses,
        vec![
            MonthlyExpense { year: 2025, month: 1, amount: dec!(15.00) },
            MonthlyExpense { year: 2025, month: 6, amount: dec!(15.00) },
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_create_with_unknown_user_persists_nothing() -> Result<()> {
    let fx = Fixture::new();
    let owner = fx.user("Ana").await?;
    let ghost = Uuid::new_v4();

    let err = fx
        .repository
        .create(&bill_input("Internet", "40", &[owner, ghost], "pending"), owner)
        .await
        .unwrap_err();
    match err {
        BillError::Validation(errors) => assert!(errors.has_field("users")),
        other => panic!("unexpected error: {other:?}"),
    }

    let page = fx.repository.list(&ListParams::default(), owner).await?;
    assert_eq!(page.total, 0);
    Ok(())
}

#[tokio::test]
async fn test_invalid_input_is_rejected_before_storage() -> Result<()> {
    let fx = Fixture::new();
    let owner = fx.user("Ana").await?;

    let err = fx
        .repository
        .create(&bill_input("", "-1", &[owner], "overdue"), owner)
        .await
        .unwrap_err();
    let BillError::Validation(errors) = err else {
        panic!("expected validation error");
    };
    assert!(errors.has_field("title"));
    assert!(errors.has_field("amount"));
    assert!(errors.has_field("status"));
    assert_eq!(fx.stats.summarize(owner, today()).await?.total_bills, 0);
    Ok(())
}

#[tokio::test]
async fn test_access_rules() -> Result<()> {
    let fx = Fixture::new();
    let owner = fx.user("Ana").await?;
    let participant = fx.user("Ben").await?;
    let outsider = fx.user("Eve").await?;

    let bill = fx
        .repository
        .create(&bill_input("Rent share", "120", &[participant], "pending"), owner)
        .await?;

    // Creator can read even without being a participant
    assert_eq!(fx.repository.get_by_id(bill.id, owner).await?.id, bill.id);
    assert_eq!(fx.repository.get_by_id(bill.id, participant).await?.id, bill.id);

    assert!(matches!(
        fx.repository.get_by_id(bill.id, outsider).await,
        Err(BillError::AccessDenied(_))
    ));
    assert!(matches!(
        fx.repository.get_by_id(Uuid::new_v4(), outsider).await,
        Err(BillError::NotFound(_))
    ));

    let paid = patch(json!({"status": "paid"}));
    assert!(matches!(
        fx.repository.update(bill.id, &paid, participant).await,
        Err(BillError::AccessDenied(_))
    ));
    assert!(matches!(
        fx.repository.delete(bill.id, participant).await,
        Err(BillError::AccessDenied(_))
    ));
    assert!(matches!(
        fx.repository.delete(Uuid::new_v4(), owner).await,
        Err(BillError::NotFound(_))
    ));

    // Outsiders see nothing in listings
    assert_eq!(fx.repository.list(&ListParams::default(), outsider).await?.total, 0);

    fx.repository.delete(bill.id, owner).await?;
    assert!(matches!(
        fx.repository.get_by_id(bill.id, owner).await,
        Err(BillError::NotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_pagination_is_disjoint_and_newest_first() -> Result<()> {
    let fx = Fixture::new();
    let owner = fx.user("Ana").await?;
    let friend = fx.user("Ben").await?;

    for i in 0..25 {
        // Alternate ownership; every bill stays visible to `owner`
        let (creator, users) = if i % 2 == 0 {
            (owner, vec![friend])
        } else {
            (friend, vec![owner, friend])
        };
        fx.repository
            .create(&bill_input(&format!("Bill {i}"), "10", &users, "pending"), creator)
            .await?;
    }

    let params = |page: &str| ListParams {
        page: Some(page.to_string()),
        limit: Some("10".to_string()),
        ..Default::default()
    };
    let first = fx.repository.list(&params("1"), owner).await?;
    let second = fx.repository.list(&params("2"), owner).await?;
    let third = fx.repository.list(&params("3"), owner).await?;

    assert_eq!(second.items.len(), 10);
    assert_eq!(third.items.len(), 5);
    assert_eq!(second.total, 25);
    assert_eq!(second.pages, 3);
    assert_eq!(second.page, 2);
    assert!(
        second
            .items
            .iter()
            .all(|b| first.items.iter().all(|a| a.id != b.id))
    );

    let all: Vec<_> = first
        .items
        .iter()
        .chain(&second.items)
        .chain(&third.items)
        .collect();
    assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    assert_eq!(all.first().map(|b| b.title.as_str()), Some("Bill 24"));
    Ok(())
}

#[tokio::test]
async fn test_list_search_and_category() -> Result<()> {
    let fx = Fixture::new();
    let owner = fx.user("Ana").await?;

    let mut raw = json!({
        "title": "Fibre",
        "amount": 45,
        "description": "Home INTERNET plan",
        "dueDate": "2030-02-01",
        "category": "internet",
        "users": [owner.to_string()],
    });
    fx.repository.create(&input(raw.clone()), owner).await?;
    raw["title"] = json!("Boiler gas");
    raw["description"] = json!("winter");
    raw["category"] = json!("gas");
    fx.repository.create(&input(raw), owner).await?;

    let by_search = fx
        .repository
        .list(
            &ListParams {
                search: Some("internet".to_string()),
                ..Default::default()
            },
            owner,
        )
        .await?;
    assert_eq!(by_search.total, 1);
    assert_eq!(by_search.items[0].category, Category::Internet);

    let by_category = fx
        .repository
        .list(
            &ListParams {
                category: Some("gas".to_string()),
                ..Default::default()
            },
            owner,
        )
        .await?;
    assert_eq!(by_category.total, 1);
    assert_eq!(by_category.items[0].title, "Boiler gas");

    let bad = fx
        .repository
        .list(
            &ListParams {
                limit: Some("500".to_string()),
                ..Default::default()
            },
            owner,
        )
        .await;
    assert!(matches!(bad, Err(BillError::Validation(_))));
    Ok(())
}

#[tokio::test]
async fn test_update_round_trip_keeps_other_fields() -> Result<()> {
    let fx = Fixture::new();
    let owner = fx.user("Ana").await?;
    let friend = fx.user("Ben").await?;

    let created = fx
        .repository
        .create(&bill_input("Water", "33.30", &[owner, friend], "pending"), owner)
        .await?;

    let updated = fx
        .repository
        .update(created.id, &patch(json!({"status": "paid", "createdBy": friend})), owner)
        .await?;
    assert_eq!(updated.status, BillStatus::Paid);

    let fetched = fx.repository.get_by_id(created.id, owner).await?;
    assert_eq!(fetched.status, BillStatus::Paid);
    assert_eq!(fetched.title, created.title);
    assert_eq!(fetched.amount, created.amount);
    assert_eq!(fetched.date, created.date);
    assert_eq!(fetched.due_date, created.due_date);
    assert_eq!(fetched.category, created.category);
    assert_eq!(fetched.users, created.users);
    assert_eq!(fetched.created_by, created.created_by);
    assert_eq!(fetched.created_at, created.created_at);
    assert_eq!(fetched.revision, created.revision + 1);
    Ok(())
}

#[tokio::test]
async fn test_update_rechecks_participants() -> Result<()> {
    let fx = Fixture::new();
    let owner = fx.user("Ana").await?;

    let created = fx
        .repository
        .create(&bill_input("Gas", "20", &[owner], "pending"), owner)
        .await?;

    let err = fx
        .repository
        .update(
            created.id,
            &patch(json!({"users": [owner.to_string(), Uuid::new_v4().to_string()]})),
            owner,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BillError::Validation(_)));

    let unchanged = fx.repository.get_by_id(created.id, owner).await?;
    assert_eq!(unchanged.users.len(), 1);
    assert_eq!(unchanged.revision, 1);
    Ok(())
}

#[tokio::test]
async fn test_stale_revision_conflicts() -> Result<()> {
    let fx = Fixture::new();
    let owner = fx.user("Ana").await?;

    let created = fx
        .repository
        .create(&bill_input("Internet", "50", &[owner], "pending"), owner)
        .await?;

    fx.repository
        .update(
            created.id,
            &patch(json!({"amount": 55, "expectedRevision": created.revision})),
            owner,
        )
        .await?;

    let stale = fx
        .repository
        .update(
            created.id,
            &patch(json!({"amount": 60, "expectedRevision": created.revision})),
            owner,
        )
        .await;
    assert!(matches!(stale, Err(BillError::Conflict(_))));

    let current = fx.repository.get_by_id(created.id, owner).await?;
    assert_eq!(current.amount, dec!(55));
    Ok(())
}

#[tokio::test]
async fn test_stored_bill_without_participants_does_not_panic() -> Result<()> {
    let fx = Fixture::new();
    let owner = fx.user("Ana").await?;
    let created = fx
        .repository
        .create(&bill_input("Gas", "18", &[owner], "pending"), owner)
        .await?;

    // Simulate a corrupted record written behind the repository's back
    let mut raw = BillStore::find_by_id(fx.store.as_ref(), created.id)
        .await?
        .expect("stored bill");
    raw.users.clear();
    fx.store.update(&raw, None).await?;

    let view = fx.repository.get_by_id(created.id, owner).await?;
    assert_eq!(view.amount_per_person, dec!(18));
    assert!(view.users.is_empty());
    Ok(())
}
