//! 请求代数（丢弃过期响应）
//!
//! 每次发起加载都会拿到一个新票据；响应回来时只有持有当前票据的才会被应用

/// 一次加载请求的票据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket(u64);

impl LoadTicket {
    pub fn generation(self) -> u64 {
        self.0
    }
}

/// 单调递增的代数计数器
#[derive(Debug, Clone, Default)]
pub struct Generation {
    current: u64,
}

impl Generation {
    /// 开始新一代请求，之前发出的票据全部失效
    pub fn advance(&mut self) -> LoadTicket {
        self.current += 1;
        LoadTicket(self.current)
    }

    pub fn is_current(&self, ticket: LoadTicket) -> bool {
        ticket.0 == self.current
    }
}
