pub mod mock_authority;
