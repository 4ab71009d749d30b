//! 调用者身份
//!
//! 认证在本核心之外完成，这里只承载已验证过的用户 ID。

use crate::value_objects::UserId;

/// 已通过上游认证的调用者，作为每个用例的第一个参数传入。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Caller {
    user_id: UserId,
}

impl Caller {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

impl From<UserId> for Caller {
    fn from(user_id: UserId) -> Self {
        Self::new(user_id)
    }
}
