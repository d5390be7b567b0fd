//! Conversions between stored records and wire DTOs.

pub use nebula_api_types::{
    CreatePostDto, CreateUserDto, PostDto, UpdatePostDto, UpdateUserDto, UserDto,
};

use crate::domain::entities::{PostRecord, UserRecord};

impl From<PostRecord> for PostDto {
    fn from(record: PostRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            content: record.content,
            user_id: record.user_id,
            user_name: record.user_name,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

impl From<UserRecord> for UserDto {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            email: record.email,
        }
    }
}
