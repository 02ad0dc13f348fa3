//! Stayin 数据存储契约
//!
//! 处理器可见的副作用操作，均在消费循环开启的工作单元中执行，与账本写入一起提交。
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stayin_eventing::persist::UnitOfWork;
use std::fmt;
use std::str::FromStr;

/// 用户资料
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub phone_number: Option<String>,
}

/// 房源状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HouseStatus {
    /// 已创建，等待审核
    Pending,
    Approved,
    /// 被删除或驳回
    Deleted,
    /// 发布者隐藏
    Hidden,
    Archived,
}

impl HouseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Deleted => "deleted",
            Self::Hidden => "hidden",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for HouseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HouseStatus {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "deleted" => Ok(Self::Deleted),
            "hidden" => Ok(Self::Hidden),
            "archived" => Ok(Self::Archived),
            other => Err(AppError::Validation(format!("unknown house status: {other}"))),
        }
    }
}

/// 房源
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HousePublication {
    pub id: String,
    pub creator_id: String,
    pub status: HouseStatus,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// 租约，由预订生成
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rental {
    pub id: String,
    pub house_publication_id: String,
    pub renter_id: String,
    pub started_date: Option<String>,
    pub ended_date: Option<String>,
    /// 创建时房源的标题快照
    pub publication_title: Option<String>,
}

/// 工作单元上的副作用操作
///
/// 写操作均为幂等的覆盖写；删除不存在的记录不是错误。
#[async_trait]
pub trait StayinWork: UnitOfWork {
    /// 插入或覆盖用户资料
    async fn upsert_user(&mut self, user: UserProfile) -> AppResult<()>;

    /// 覆盖已有用户的资料，返回用户此前是否存在（不存在时插入）
    async fn update_user(&mut self, user: UserProfile) -> AppResult<bool>;

    async fn delete_user_details(&mut self, user_id: &str) -> AppResult<()>;

    async fn create_house_publication(&mut self, publication: HousePublication) -> AppResult<()>;

    async fn get_house_publication(&mut self, id: &str) -> AppResult<Option<HousePublication>>;

    async fn add_rental(&mut self, rental: Rental) -> AppResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn house_status_round_trips_through_text() {
        for status in [
            HouseStatus::Pending,
            HouseStatus::Approved,
            HouseStatus::Deleted,
            HouseStatus::Hidden,
            HouseStatus::Archived,
        ] {
            assert_eq!(status.as_str().parse::<HouseStatus>().unwrap(), status);
        }
        assert!("published".parse::<HouseStatus>().is_err());
    }
}
