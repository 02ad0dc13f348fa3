//! 事件处理器：每类事件一个，只通过 `StayinWork` 修改状态
use crate::events::{
    AppartementCreatedEvent, NullEvent, ReservationCreatedEvent, UserCreatedEvent,
    UserDeletedEvent, UserUpdatedEvent,
};
use crate::store::{HousePublication, HouseStatus, Rental, StayinWork, UserProfile};
use async_trait::async_trait;
use stayin_eventing::eventing::EventHandler;
use tracing::debug;

pub struct UserCreatedHandler;

#[async_trait]
impl<W: StayinWork> EventHandler<UserCreatedEvent, W> for UserCreatedHandler {
    async fn handle(&self, event: UserCreatedEvent, work: &mut W) -> anyhow::Result<()> {
        work.upsert_user(UserProfile {
            user_id: event.user_id,
            username: event.username,
            email: event.email,
            phone_number: event.phone_number,
        })
        .await?;
        Ok(())
    }
}

/// 资料变更先于注册到达时直接建立用户
pub struct UserUpdatedHandler;

#[async_trait]
impl<W: StayinWork> EventHandler<UserUpdatedEvent, W> for UserUpdatedHandler {
    async fn handle(&self, event: UserUpdatedEvent, work: &mut W) -> anyhow::Result<()> {
        let user_id = event.user_id.clone();
        let existed = work
            .update_user(UserProfile {
                user_id: event.user_id,
                username: event.new_username,
                email: event.new_email,
                phone_number: event.new_phone_number,
            })
            .await?;

        if !existed {
            debug!(user_id = %user_id, "updated user was unknown, inserted");
        }
        Ok(())
    }
}

pub struct UserDeletedHandler;

#[async_trait]
impl<W: StayinWork> EventHandler<UserDeletedEvent, W> for UserDeletedHandler {
    async fn handle(&self, event: UserDeletedEvent, work: &mut W) -> anyhow::Result<()> {
        work.delete_user_details(&event.user_id).await?;
        Ok(())
    }
}

pub struct AppartementCreatedHandler;

#[async_trait]
impl<W: StayinWork> EventHandler<AppartementCreatedEvent, W> for AppartementCreatedHandler {
    async fn handle(&self, event: AppartementCreatedEvent, work: &mut W) -> anyhow::Result<()> {
        work.create_house_publication(HousePublication {
            id: event.id,
            creator_id: event.owner,
            status: HouseStatus::Approved,
            title: event.title,
            description: event.description,
        })
        .await?;
        Ok(())
    }
}

/// 租约复制房源当前标题；房源未知时标题为空
pub struct ReservationCreatedHandler;

#[async_trait]
impl<W: StayinWork> EventHandler<ReservationCreatedEvent, W> for ReservationCreatedHandler {
    async fn handle(&self, event: ReservationCreatedEvent, work: &mut W) -> anyhow::Result<()> {
        let publication = work.get_house_publication(&event.appartement).await?;
        if publication.is_none() {
            debug!(
                rental_id = %event.id,
                publication_id = %event.appartement,
                "reservation references an unknown publication"
            );
        }

        work.add_rental(Rental {
            id: event.id,
            house_publication_id: event.appartement,
            renter_id: event.user,
            started_date: event.check_in,
            ended_date: event.check_out,
            publication_title: publication.and_then(|p| p.title),
        })
        .await?;
        Ok(())
    }
}

pub struct NullEventHandler;

#[async_trait]
impl<W: StayinWork> EventHandler<NullEvent, W> for NullEventHandler {
    async fn handle(&self, _event: NullEvent, _work: &mut W) -> anyhow::Result<()> {
        Ok(())
    }
}
