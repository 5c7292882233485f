use crate::models::{
    Account, Character, ConversationEntry, FavorLevel, Message, NewAccount, NewCharacter, SetFavor, Suggestion,
    SuggestionStatus, UpdateAccount, UpdateCharacter, User,
};
use crate::suggestions::{CreateSuggestionRequest, ReplyRequest, ToggleStatusRequest};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::session_login,
        crate::routes::issue_id_token,
        crate::routes::set_user_admin,
        crate::routes::create_account,
        crate::routes::create_character,
        crate::routes::set_favor,
        crate::routes::import_characters,
        crate::routes::create_suggestion,
        crate::routes::reply_to_suggestion,
        crate::routes::toggle_suggestion_status,
        crate::routes::admin_list_suggestions,
        crate::routes::upload_signature,
    ),
    components(schemas(
        User, Account, NewAccount, UpdateAccount,
        Character, NewCharacter, UpdateCharacter, FavorLevel, SetFavor,
        Suggestion, SuggestionStatus, ConversationEntry, Message,
        CreateSuggestionRequest, ReplyRequest, ToggleStatusRequest,
        crate::routes::SessionLoginRequest, crate::routes::SessionResponse, crate::routes::IdTokenResponse, crate::routes::SetAdminRequest,
        crate::routes::ImportCharactersRequest, crate::routes::ToggleStatusResponse,
        crate::routes::SignatureRequest, crate::routes::SignatureResponse,
        crate::error::ApiErrorBody,
    )),
    tags(
        (name = "characters", description = "Accounts, characters and favor levels"),
        (name = "suggestions", description = "Suggestion inbox and conversations"),
        (name = "uploads", description = "Signed direct-to-cloud uploads"),
    )
)]
pub struct ApiDoc;
