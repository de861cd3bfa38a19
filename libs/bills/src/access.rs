//! Two-tier access policy: the creator owns a bill, participants may read it

use crate::models::{Bill, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Access {
    None,
    Read,
    Write,
}

impl Access {
    pub fn can_read(self) -> bool {
        self >= Access::Read
    }

    pub fn can_write(self) -> bool {
        self == Access::Write
    }
}

pub fn access_for(bill: &Bill, user: UserId) -> Access {
    if bill.created_by == user {
        Access::Write
    } else if bill.is_participant(user) {
        Access::Read
    } else {
        Access::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BillStatus, Category};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn bill(created_by: UserId, users: Vec<UserId>) -> Bill {
        let now = Utc::now();
        Bill {
            id: Uuid::new_v4(),
            title: "Water".to_string(),
            amount: dec!(30),
            description: None,
            date: now.date_naive(),
            due_date: now.date_naive(),
            status: BillStatus::Pending,
            category: Category::Water,
            users,
            created_by,
            revision: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_creator_writes_even_when_not_participating() {
        let creator = Uuid::new_v4();
        let bill = bill(creator, vec![Uuid::new_v4()]);
        assert_eq!(access_for(&bill, creator), Access::Write);
        assert!(access_for(&bill, creator).can_read());
    }

    #[test]
    fn test_participant_reads_only() {
        let participant = Uuid::new_v4();
        let bill = bill(Uuid::new_v4(), vec![participant]);
        let access = access_for(&bill, participant);
        assert!(access.can_read());
        assert!(!access.can_write());
    }

    #[test]
    fn test_outsider_has_no_access() {
        let bill = bill(Uuid::new_v4(), vec![Uuid::new_v4()]);
        assert_eq!(access_for(&bill, Uuid::new_v4()), Access::None);
    }
}
