//! Page data capability.
//!
//! Every value handed to the render pipeline exposes its common context
//! slot (and optionally an application error) through [`PageData`]. The
//! whole value is serialized as the template's root context.

use crate::context::CommonContext;
use serde::Serialize;
use std::error::Error;

pub trait PageData: Serialize {
    /// Common context currently on the page (possibly caller-populated).
    fn common(&self) -> &CommonContext;

    /// Replace the page's common context.
    fn set_common(&mut self, common: CommonContext);

    /// Application error this page reports, if any. A `Some` makes the
    /// pipeline generate a correlation ID.
    fn error(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

/// Implement [`PageData`] for a struct with a `common: CommonContext` field.
///
/// ```ignore
/// #[derive(Serialize)]
/// struct RepoPage { common: CommonContext, name: String }
/// page_data!(RepoPage);
///
/// #[derive(Serialize)]
/// struct ErrorPage { common: CommonContext, #[serde(skip)] err: Option<MyError> }
/// page_data!(ErrorPage, error = err);
/// ```
#[macro_export]
macro_rules! page_data {
    ($ty:ty) => {
        impl $crate::page::PageData for $ty {
            fn common(&self) -> &$crate::context::CommonContext {
                &self.common
            }

            fn set_common(&mut self, common: $crate::context::CommonContext) {
                self.common = common;
            }
        }
    };
    ($ty:ty, error = $field:ident) => {
        impl $crate::page::PageData for $ty {
            fn common(&self) -> &$crate::context::CommonContext {
                &self.common
            }

            fn set_common(&mut self, common: $crate::context::CommonContext) {
                self.common = common;
            }

            fn error(&self) -> ::std::option::Option<&(dyn ::std::error::Error + 'static)> {
                self.$field
                    .as_ref()
                    .map(|err| err as &(dyn ::std::error::Error + 'static))
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_data;

    #[derive(Debug, thiserror::Error)]
    #[error("repo not found")]
    struct NotFound;

    #[derive(Serialize, Default)]
    struct Plain {
        common: CommonContext,
        title: String,
    }
    page_data!(Plain);

    #[derive(Serialize, Default)]
    struct WithError {
        common: CommonContext,
        #[serde(skip)]
        err: Option<NotFound>,
    }
    page_data!(WithError, error = err);

    #[test]
    fn test_plain_page() {
        let mut page = Plain::default();
        assert!(page.error().is_none());

        page.set_common(CommonContext {
            hide_motd: true,
            ..CommonContext::default()
        });
        assert!(page.common().hide_motd);
    }

    #[test]
    fn test_error_page() {
        let mut page = WithError::default();
        assert!(page.error().is_none());

        page.err = Some(NotFound);
        assert_eq!(page.error().map(ToString::to_string).as_deref(), Some("repo not found"));
    }

    #[test]
    fn test_page_serializes_common() {
        let page = Plain {
            title: "Home".into(),
            ..Plain::default()
        };
        let value = serde_json::to_value(&page).unwrap();
        assert_eq!(value["title"], "Home");
        assert_eq!(value["common"]["hide_motd"], false);
    }
}
