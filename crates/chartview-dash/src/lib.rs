pub mod chart;
pub mod dashboard;
pub mod pagination;

pub use crate::chart::{Chart, ChartStyle, DailyChange, PivotPoints};
pub use crate::dashboard::{
    Dashboard, DashboardSettings, Interaction, Notice, NoticeLevel, Page, PageState, Panel,
    Selection, SeriesSource, Session,
};
pub use crate::pagination::{PageWindow, DEFAULT_PAGE_SIZE};
