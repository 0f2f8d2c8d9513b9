use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    auth,
    models::UserRole,
    storage::{KeyValueStore, StorageState, TOKEN_KEY, USER_ROLE_KEY},
};

pub const HOME_PATH: &str = "/";
pub const LOGIN_PATH: &str = "/login";

// --- Route Table ---

/// RouteMeta
///
/// Display and access-control metadata attached to a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteMeta {
    pub title: Option<&'static str>,
    pub requires_auth: bool,
    /// Only meaningful together with `requires_auth`.
    pub role: Option<UserRole>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteRecord {
    pub path: &'static str,
    pub name: &'static str,
    pub meta: RouteMeta,
}

const fn public(path: &'static str, name: &'static str, title: &'static str) -> RouteRecord {
    RouteRecord {
        path,
        name,
        meta: RouteMeta {
            title: Some(title),
            requires_auth: false,
            role: None,
        },
    }
}

const fn gated(path: &'static str, name: &'static str, title: &'static str, role: UserRole) -> RouteRecord {
    RouteRecord {
        path,
        name,
        meta: RouteMeta {
            title: Some(title),
            requires_auth: true,
            role: Some(role),
        },
    }
}

/// ROUTES
///
/// Every view the shell can navigate to.
pub static ROUTES: [RouteRecord; 8] = [
    public("/", "Home", "学习冒险 - 首页"),
    public("/login", "Login", "登录"),
    gated("/student", "StudentDashboard", "学生控制台", UserRole::Student),
    gated("/student/quest", "QuestMap", "任务地图", UserRole::Student),
    gated("/student/battle", "Battle", "学习战斗", UserRole::Student),
    gated("/student/shop", "Shop", "装备商店", UserRole::Student),
    gated("/parent", "ParentDashboard", "家长控制台", UserRole::Parent),
    gated("/teacher", "TeacherDashboard", "教师控制台", UserRole::Teacher),
];

/// Strips query and fragment and a single trailing slash.
pub fn normalize_path(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = &path[..end];
    match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ if path.is_empty() => HOME_PATH,
        _ => path,
    }
}

/// Finds the route for `path`, matching case-insensitively after normalization.
pub fn resolve(path: &str) -> Option<&'static RouteRecord> {
    let path = normalize_path(path);
    ROUTES
        .iter()
        .find(|route| route.path.eq_ignore_ascii_case(path))
}

// --- Guard ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Allow,
    Redirect(&'static str),
}

/// GuardDecision
///
/// The outcome of one guard pass: the title to display (if the target route
/// has one) and whether the navigation proceeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardDecision {
    pub title: Option<&'static str>,
    pub navigation: Navigation,
}

/// guard
///
/// The pre-navigation check. Reads the persisted token and role; never fails.
/// Missing, empty, expired or unparseable values all mean "not authenticated"
/// or "no role".
pub fn guard(target: &str, storage: &dyn KeyValueStore) -> GuardDecision {
    let Some(route) = resolve(target) else {
        // Nothing matched, so there is nothing to guard.
        return GuardDecision {
            title: None,
            navigation: Navigation::Allow,
        };
    };

    let title = route.meta.title;
    let navigation = if route.meta.requires_auth {
        check_access(route, storage)
    } else {
        Navigation::Allow
    };

    tracing::debug!(path = target, route = route.name, ?navigation, "navigation guarded");
    GuardDecision { title, navigation }
}

fn check_access(route: &RouteRecord, storage: &dyn KeyValueStore) -> Navigation {
    let has_token = storage
        .get(TOKEN_KEY)
        .is_some_and(|token| !token.is_empty() && !auth::token_is_expired(&token));
    if !has_token {
        return Navigation::Redirect(LOGIN_PATH);
    }

    if let Some(required) = route.meta.role {
        let persisted = storage
            .get(USER_ROLE_KEY)
            .and_then(|role| role.parse::<UserRole>().ok());
        if persisted != Some(required) {
            return Navigation::Redirect(HOME_PATH);
        }
    }

    Navigation::Allow
}

// --- Navigator ---

/// Upper bound on redirect hops for one navigation. The redirect targets are
/// public routes, so a single hop is all that ever happens.
const MAX_REDIRECTS: usize = 3;

/// Navigator
///
/// The stateful side of navigation: the current location and the display
/// title, updated by running the guard on every `navigate` call and following
/// its redirects.
pub struct Navigator {
    storage: StorageState,
    location: String,
    title: Option<String>,
}

/// NavigatorState
///
/// The navigator shared by the shell's HTTP handlers.
pub type NavigatorState = Arc<Mutex<Navigator>>;

impl Navigator {
    pub fn new(storage: StorageState) -> Self {
        Self {
            storage,
            location: HOME_PATH.to_string(),
            title: None,
        }
    }

    pub fn into_state(self) -> NavigatorState {
        Arc::new(Mutex::new(self))
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// navigate
    ///
    /// Attempts to move to `path` and returns where the shell ended up.
    pub fn navigate(&mut self, path: &str) -> NavigationResponse {
        let requested = normalize_path(path).to_string();
        let mut target = requested.clone();
        let mut redirected = false;

        for _ in 0..MAX_REDIRECTS {
            let decision = guard(&target, self.storage.as_ref());
            if let Some(title) = decision.title {
                self.title = Some(title.to_string());
            }

            match decision.navigation {
                Navigation::Allow => break,
                Navigation::Redirect(to) => {
                    redirected = true;
                    target = to.to_string();
                }
            }
        }

        self.location = target;
        NavigationResponse {
            requested,
            location: self.location.clone(),
            redirected,
            title: self.title.clone(),
        }
    }

    pub fn snapshot(&self) -> NavigationResponse {
        NavigationResponse {
            requested: self.location.clone(),
            location: self.location.clone(),
            redirected: false,
            title: self.title.clone(),
        }
    }
}

// --- Wire Shapes ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct NavigationResponse {
    pub requested: String,
    pub location: String,
    pub redirected: bool,
    pub title: Option<String>,
}

/// RouteView
///
/// Serializable form of a `RouteRecord` for the view layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RouteView {
    pub path: String,
    pub name: String,
    pub title: Option<String>,
    pub requires_auth: bool,
    pub role: Option<UserRole>,
}

impl From<&RouteRecord> for RouteView {
    fn from(route: &RouteRecord) -> Self {
        Self {
            path: route.path.to_string(),
            name: route.name.to_string(),
            title: route.meta.title.map(str::to_string),
            requires_auth: route.meta.requires_auth,
            role: route.meta.role,
        }
    }
}
