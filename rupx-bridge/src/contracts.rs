//! Bindings for the two deployed bridge contracts.
//!
//! Both ABIs are fixed; the core only calls them. `withdraw` and `mint` are
//! relayer-side methods and are bound for completeness.

pub mod rupaya {
    use ethers::prelude::abigen;

    abigen!(
        RupayaBridge,
        r#"[
            function deposit() payable
            function withdraw(address to, uint256 amount)
            function maxTransferAmount() view returns (uint256)
            function transferCooldown() view returns (uint256)
            event Deposit(address indexed from, uint256 amount, uint256 timestamp)
            event Withdraw(address indexed to, uint256 amount, uint256 timestamp)
        ]"#,
    );
}

pub mod binance {
    use ethers::prelude::abigen;

    abigen!(
        BinanceBridge,
        r#"[
            function mint(address to, uint256 amount)
            function burn(uint256 amount)
            function balanceOf(address account) view returns (uint256)
            function maxTransferAmount() view returns (uint256)
            function transferCooldown() view returns (uint256)
            event Burn(address indexed from, uint256 amount, uint256 timestamp)
            event Mint(address indexed to, uint256 amount, uint256 timestamp)
        ]"#,
    );
}

pub use binance::BinanceBridge;
pub use rupaya::RupayaBridge;
