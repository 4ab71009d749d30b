use domain::Caller;

use crate::error::ApplicationError;

/// 把上游凭证解析成调用者身份。
///
/// 会话签发不在本服务内，这里只验证凭证；无效或缺失时返回 `Unauthenticated`。
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, credential: Option<&str>) -> Result<Caller, ApplicationError>;
}
