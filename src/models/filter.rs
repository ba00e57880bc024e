//! Post filtering
//!
//! A `PostFilter` is the full predicate behind every post listing: which posts
//! the caller may see (`Visibility`), an optional publication window
//! (`TimeWindow`), the list query filters and an ordering. The repository
//! translates it to SQL; `PostFilter::matches` is the same predicate evaluated
//! in memory.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::{Post, User};

/// Who is making a request
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Caller {
    #[default]
    Anonymous,
    User(User),
}

impl Caller {
    /// The authenticated user, if any
    pub fn user(&self) -> Option<&User> {
        match self {
            Caller::Anonymous => None,
            Caller::User(user) => Some(user),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Caller::User(_))
    }

    pub fn is_staff(&self) -> bool {
        self.user().map(|u| u.is_staff).unwrap_or(false)
    }
}

/// Which posts a caller may observe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Only posts with `published_at <= now`
    Published,
    /// Every post
    Unrestricted,
    /// Published posts plus everything written by the given author
    PublishedOrAuthor(i64),
}

impl Visibility {
    /// Anonymous callers see published posts, staff see published posts and
    /// their own drafts, other authenticated users see everything.
    pub fn for_caller(caller: &Caller) -> Self {
        match caller {
            Caller::Anonymous => Visibility::Published,
            Caller::User(user) if user.is_staff => Visibility::PublishedOrAuthor(user.id),
            Caller::User(_) => Visibility::Unrestricted,
        }
    }

    /// Whether a post is visible as of `now`
    pub fn allows(&self, post: &Post, now: DateTime<Utc>) -> bool {
        match self {
            Visibility::Published => post.is_published(now),
            Visibility::Unrestricted => true,
            Visibility::PublishedOrAuthor(author_id) => {
                post.is_published(now) || post.author_id == *author_id
            }
        }
    }
}

/// Error returned when a time period name is not recognised
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Time period {0} is not valid, should be 'new', 'today' or 'week'")]
pub struct InvalidTimeWindow(pub String);

/// Publication window for time-based listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    /// Published within the last hour
    New,
    /// Published on the current UTC calendar day
    Today,
    /// Published within the last seven days
    Week,
}

impl TimeWindow {
    /// Inclusive lower bound and optional exclusive upper bound on `published_at`
    pub fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, Option<DateTime<Utc>>) {
        match self {
            TimeWindow::New => (now - Duration::hours(1), None),
            TimeWindow::Today => {
                let start = start_of_day(now.date_naive());
                (start, Some(start + Duration::days(1)))
            }
            TimeWindow::Week => (now - Duration::days(7), None),
        }
    }

    /// Posts without a publication date never fall inside a window
    pub fn contains(&self, published_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let Some(at) = published_at else {
            return false;
        };
        let (from, until) = self.bounds(now);
        at >= from && until.map_or(true, |until| at < until)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::New => "new",
            TimeWindow::Today => "today",
            TimeWindow::Week => "week",
        }
    }
}

impl FromStr for TimeWindow {
    type Err = InvalidTimeWindow;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(TimeWindow::New),
            "today" => Ok(TimeWindow::Today),
            "week" => Ok(TimeWindow::Week),
            other => Err(InvalidTimeWindow(other.to_string())),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for an unknown `ordering` value
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid ordering '{0}', expected one of published_at, title, slug, author (optionally prefixed with '-')")]
pub struct InvalidOrdering(pub String);

/// Sortable post fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderField {
    PublishedAt,
    Title,
    Slug,
    Author,
}

impl OrderField {
    /// Column the field sorts on
    pub fn column(&self) -> &'static str {
        match self {
            OrderField::PublishedAt => "p.published_at",
            OrderField::Title => "p.title",
            OrderField::Slug => "p.slug",
            OrderField::Author => "p.author_id",
        }
    }
}

/// Explicit ordering requested with `?ordering=`; ties break on ascending id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostOrdering {
    pub field: OrderField,
    pub descending: bool,
}

impl PostOrdering {
    /// Compare two posts. Missing publication dates sort first when ascending.
    pub fn compare(&self, a: &Post, b: &Post) -> Ordering {
        let primary = match self.field {
            OrderField::PublishedAt => a.published_at.cmp(&b.published_at),
            OrderField::Title => a.title.cmp(&b.title),
            OrderField::Slug => a.slug.cmp(&b.slug),
            OrderField::Author => a.author_id.cmp(&b.author_id),
        };
        let primary = if self.descending {
            primary.reverse()
        } else {
            primary
        };
        primary.then(a.id.cmp(&b.id))
    }

    /// `ORDER BY` expression without the keyword
    pub fn to_sql(&self) -> String {
        format!(
            "{} {}, p.id ASC",
            self.field.column(),
            if self.descending { "DESC" } else { "ASC" }
        )
    }
}

impl FromStr for PostOrdering {
    type Err = InvalidOrdering;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (descending, name) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let field = match name {
            "published_at" => OrderField::PublishedAt,
            "title" => OrderField::Title,
            "slug" => OrderField::Slug,
            "author" => OrderField::Author,
            _ => return Err(InvalidOrdering(s.to_string())),
        };
        Ok(Self { field, descending })
    }
}

/// Midnight UTC at the start of `date`
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Complete post predicate, evaluated against a fixed `now`
#[derive(Debug, Clone, PartialEq)]
pub struct PostFilter {
    pub visibility: Visibility,
    pub window: Option<TimeWindow>,
    pub author_id: Option<i64>,
    pub tag_id: Option<i64>,
    /// Case-insensitive substring of the author's email
    pub author_email_contains: Option<String>,
    /// Published on or after this day
    pub published_from: Option<NaiveDate>,
    /// Published on or before this day (whole day included)
    pub published_to: Option<NaiveDate>,
    pub ordering: Option<PostOrdering>,
    pub now: DateTime<Utc>,
}

impl PostFilter {
    /// Filter with only a visibility rule
    pub fn new(visibility: Visibility, now: DateTime<Utc>) -> Self {
        Self {
            visibility,
            window: None,
            author_id: None,
            tag_id: None,
            author_email_contains: None,
            published_from: None,
            published_to: None,
            ordering: None,
            now,
        }
    }

    pub fn with_window(mut self, window: Option<TimeWindow>) -> Self {
        self.window = window;
        self
    }

    pub fn with_author(mut self, author_id: i64) -> Self {
        self.author_id = Some(author_id);
        self
    }

    pub fn with_tag(mut self, tag_id: i64) -> Self {
        self.tag_id = Some(tag_id);
        self
    }

    pub fn with_ordering(mut self, ordering: Option<PostOrdering>) -> Self {
        self.ordering = ordering;
        self
    }

    /// Inclusive lower bound from `published_from`
    pub fn published_from_bound(&self) -> Option<DateTime<Utc>> {
        self.published_from.map(start_of_day)
    }

    /// Exclusive upper bound from `published_to`
    pub fn published_to_bound(&self) -> Option<DateTime<Utc>> {
        self.published_to
            .map(|date| start_of_day(date) + Duration::days(1))
    }

    /// Evaluate the predicate against a single post
    pub fn matches(&self, post: &Post) -> bool {
        if !self.visibility.allows(post, self.now) {
            return false;
        }
        if let Some(window) = self.window {
            if !window.contains(post.published_at, self.now) {
                return false;
            }
        }
        if let Some(author_id) = self.author_id {
            if post.author_id != author_id {
                return false;
            }
        }
        if let Some(tag_id) = self.tag_id {
            if !post.has_tag(tag_id) {
                return false;
            }
        }
        if let Some(needle) = &self.author_email_contains {
            if !post
                .author_email
                .to_lowercase()
                .contains(&needle.to_lowercase())
            {
                return false;
            }
        }
        if let Some(from) = self.published_from_bound() {
            if !matches!(post.published_at, Some(at) if at >= from) {
                return false;
            }
        }
        if let Some(until) = self.published_to_bound() {
            if !matches!(post.published_at, Some(at) if at < until) {
                return false;
            }
        }
        true
    }

    /// Sort posts the way the store returns them
    pub fn sort(&self, posts: &mut [Post]) {
        match &self.ordering {
            Some(ordering) => posts.sort_by(|a, b| ordering.compare(a, b)),
            None => posts.sort_by_key(|p| p.id),
        }
    }

    /// Apply the predicate to an in-memory collection
    pub fn apply(&self, posts: impl IntoIterator<Item = Post>) -> Vec<Post> {
        let mut selected: Vec<Post> = posts.into_iter().filter(|p| self.matches(p)).collect();
        self.sort(&mut selected);
        selected
    }
}

/// Post endpoint actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAction {
    List,
    Create,
    Retrieve,
    Update,
    PartialUpdate,
    Destroy,
    Mine,
    TagPosts,
}

impl PostAction {
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            PostAction::Create | PostAction::Update | PostAction::PartialUpdate | PostAction::Destroy
        )
    }
}

/// Serialized form of a post
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// Everything except the content
    Compact,
    /// Compact fields plus the content
    Detailed,
}

impl ResponseShape {
    pub fn for_action(action: PostAction) -> Self {
        match action {
            PostAction::List | PostAction::Create | PostAction::Mine | PostAction::TagPosts => {
                ResponseShape::Compact
            }
            PostAction::Retrieve
            | PostAction::Update
            | PostAction::PartialUpdate
            | PostAction::Destroy => ResponseShape::Detailed,
        }
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_post() -> impl Strategy<Value = Post> {
        (
            1i64..500,
            1i64..4,
            prop::option::of(-20_000i64..20_000),
        )
            .prop_map(|(id, author_id, offset_minutes)| {
                let now = Utc::now();
                Post {
                    id,
                    author_id,
                    author_email: format!("user{}@example.com", author_id),
                    title: format!("Post {}", id),
                    slug: format!("post-{}", id),
                    summary: String::new(),
                    content: String::new(),
                    published_at: offset_minutes.map(|m| now + Duration::minutes(m)),
                    tags: Vec::new(),
                    created_at: now,
                    modified_at: now,
                }
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn anonymous_sees_exactly_published(post in arb_post()) {
            let now = Utc::now();
            let filter = PostFilter::new(Visibility::for_caller(&Caller::Anonymous), now);
            let published = matches!(post.published_at, Some(at) if at <= now);
            prop_assert_eq!(filter.matches(&post), published);
        }

        #[test]
        fn staff_sees_published_or_own(post in arb_post(), staff_id in 1i64..4) {
            let now = Utc::now();
            let staff = User {
                id: staff_id,
                email: "staff@example.com".to_string(),
                password_hash: String::new(),
                first_name: String::new(),
                last_name: String::new(),
                is_staff: true,
                is_active: true,
                date_joined: now,
            };
            let filter = PostFilter::new(Visibility::for_caller(&Caller::User(staff)), now);
            let expected = matches!(post.published_at, Some(at) if at <= now)
                || post.author_id == staff_id;
            prop_assert_eq!(filter.matches(&post), expected);
        }

        #[test]
        fn new_window_is_subset_within_last_hour(posts in prop::collection::vec(arb_post(), 0..30)) {
            let now = Utc::now();
            let base = PostFilter::new(Visibility::Published, now);
            let windowed = base.clone().with_window(Some(TimeWindow::New));

            let all = base.apply(posts.clone());
            let recent = windowed.apply(posts);

            for post in &recent {
                prop_assert!(all.contains(post));
                let at = post.published_at.unwrap();
                prop_assert!(at >= now - Duration::hours(1));
            }
        }

        #[test]
        fn unknown_period_names_are_rejected(name in "[a-z]{1,10}") {
            prop_assume!(!["new", "today", "week"].contains(&name.as_str()));
            let err = name.parse::<TimeWindow>().unwrap_err();
            prop_assert_eq!(err, InvalidTimeWindow(name));
        }
    }
}
